//! Per-item salted checksums.

use super::fan_out::{run_fan_out, FanOut};
use super::{expect_kind, Stage};
use crate::collector::{CombineRule, SubTask};
use crate::context::StageContext;
use crate::core::{Value, ValueKind};
use crate::errors::HashflowError;
use crate::gate::HashGate;
use crate::queue::{QueueReceiver, QueueSender};
use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;

/// Number of salted checksums per item.
pub const FAN6_WIDTH: usize = 6;

/// Turns each string `data` into `checksum("0" + data) + ... + checksum("5" + data)`.
#[derive(Debug, Clone)]
pub struct Fan6HashStage {
    name: String,
}

impl Fan6HashStage {
    /// Creates the stage with its default name, `fan6_hash`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("fan6_hash")
    }

    /// Creates the stage with a custom name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Fan6HashStage {
    fn default() -> Self {
        Self::new()
    }
}

impl FanOut for Fan6HashStage {
    fn combine_rule(&self) -> CombineRule {
        CombineRule::Concat
    }

    fn subtasks(&self, value: Value, gate: &Arc<HashGate>) -> Result<Vec<SubTask>, HashflowError> {
        expect_kind(&self.name, ValueKind::Text, &value)?;
        let data = value.to_string();

        Ok((0..FAN6_WIDTH)
            .map(|salt| {
                let gate = gate.clone();
                let salted = format!("{salt}{data}");
                async move { gate.checksum(salted).await }.boxed()
            })
            .collect())
    }
}

#[async_trait]
impl Stage for Fan6HashStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    async fn run(
        &self,
        ctx: StageContext,
        input: QueueReceiver,
        output: QueueSender,
    ) -> Result<(), HashflowError> {
        run_fan_out(self, ctx, input, output).await
    }
}
