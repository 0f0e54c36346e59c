//! Pipeline building and execution.
//!
//! This module provides:
//! - PipelineBuilder, which validates wiring before anything runs
//! - Pipeline, the concurrent executor
//! - PipelineRun, the report of one run
//! - signer_pipeline, the canonical fan-2 → fan-6 → sort-join pipeline

mod builder;
mod executor;
mod run;
mod signer;

pub use builder::PipelineBuilder;
pub use executor::Pipeline;
pub use run::PipelineRun;
pub use signer::signer_pipeline;
