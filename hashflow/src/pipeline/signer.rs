//! The canonical three-stage signer.

use super::{Pipeline, PipelineBuilder};
use crate::config::PipelineConfig;
use crate::errors::PipelineValidationError;
use crate::gate::HashGate;
use crate::stages::{Fan2HashStage, Fan6HashStage, SortJoinStage};
use std::sync::Arc;

/// Builds `fan2_hash → fan6_hash → sort_join` over `gate`.
///
/// Fed integers, the pipeline emits one string: every item's fan-6 value,
/// sorted and joined with `_`.
///
/// # Errors
///
/// Returns an error if `config` has a zero capacity.
pub fn signer_pipeline(
    gate: Arc<HashGate>,
    config: PipelineConfig,
) -> Result<Pipeline, PipelineValidationError> {
    PipelineBuilder::new("signer")
        .stage(Fan2HashStage::new())
        .stage(Fan6HashStage::new())
        .stage(SortJoinStage::new())
        .with_gate(gate)
        .with_config(config)
        .build()
}
