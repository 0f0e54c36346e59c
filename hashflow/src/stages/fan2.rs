//! Per-item digest and checksum pair.

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
use tracing::trace;

/// Turns each integer `v` into `checksum(v) + "~" + checksum(digest(v))`.
///
/// Both halves are computed concurrently.
#[derive(Debug, Clone)]
pub struct Fan2HashStage {
    name: String,
}

impl Fan2HashStage {
    /// Creates the stage with its default name, `fan2_hash`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("fan2_hash")
    }

    /// Creates the stage with a custom name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Fan2HashStage {
    fn default() -> Self {
        Self::new()
    }
}

impl FanOut for Fan2HashStage {
    fn combine_rule(&self) -> CombineRule {
        CombineRule::Separated("~".to_string())
    }

    fn subtasks(&self, value: Value, gate: &Arc<HashGate>) -> Result<Vec<SubTask>, HashflowError> {
        expect_kind(&self.name, ValueKind::Integer, &value)?;
        let data = value.to_string();
        trace!(stage = %self.name, data = %data, "fan2 item");

        let plain = {
            let gate = gate.clone();
            let data = data.clone();
            async move { gate.checksum(data).await }.boxed()
        };
        let digested = {
            let gate = gate.clone();
            async move {
                let digest = gate.digest(data).await?;
                gate.checksum(digest).await
            }
            .boxed()
        };

        Ok(vec![plain, digested])
    }
}

#[async_trait]
impl Stage for Fan2HashStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Integer
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrderPolicy, PipelineConfig};
    use crate::errors::PrimitiveError;
    use crate::gate::{HashPrimitives, Md5Crc32, MockHashPrimitives, StubPrimitives};
    use crate::stages::test_support::{context_with, drive, stub_context};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_fan2_with_stub_primitives() {
        let out = drive(&Fan2HashStage::new(), stub_context(), vec![Value::from(0)])
            .await
            .unwrap();
        assert_eq!(out, vec![Value::from("C(0)~C(0)")]);
    }

    #[tokio::test]
    async fn test_fan2_with_real_primitives() {
        let (ctx, _) = context_with(Arc::new(Md5Crc32), PipelineConfig::default());
        let out = drive(&Fan2HashStage::new(), ctx, vec![Value::from(0)]).await.unwrap();

        let expected = format!(
            "{}~{}",
            Md5Crc32.checksum("0").unwrap(),
            Md5Crc32.checksum(&Md5Crc32.digest("0").unwrap()).unwrap()
        );
        assert_eq!(out, vec![Value::Text(expected)]);
    }

    #[tokio::test]
    async fn test_fan2_is_deterministic() {
        let first = drive(&Fan2HashStage::new(), stub_context(), vec![Value::from(42)])
            .await
            .unwrap();
        let second = drive(&Fan2HashStage::new(), stub_context(), vec![Value::from(42)])
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fan2_input_order_policy() {
        let (ctx, _) = context_with(
            Arc::new(StubPrimitives),
            PipelineConfig::new().with_order(OrderPolicy::Input),
        );
        let inputs = (0..20).map(Value::from).collect();
        let out = drive(&Fan2HashStage::new(), ctx, inputs).await.unwrap();

        let expected: Vec<Value> = (0..20)
            .map(|i| Value::Text(format!("C({i})~C({i})")))
            .collect();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_fan2_skips_failed_item() {
        let mut mock = MockHashPrimitives::new();
        mock.expect_digest().returning(|data| Ok(data.to_string()));
        mock.expect_checksum().returning(|data| {
            if data == "1" {
                Err(PrimitiveError::new("checksum", data, "overheated"))
            } else {
                Ok(format!("c{data}"))
            }
        });

        let (ctx, failures) = context_with(Arc::new(mock), PipelineConfig::default());
        let mut out = drive(&Fan2HashStage::new(), ctx, vec![0.into(), 1.into(), 2.into()])
            .await
            .unwrap();
        out.sort_by_key(ToString::to_string);

        assert_eq!(out, vec![Value::from("c0~c0"), Value::from("c2~c2")]);
        let failures = failures.snapshot();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].item, 1);
        assert_eq!(failures[0].error_kind, "primitive");
    }

    #[tokio::test]
    async fn test_fan2_rejects_text() {
        let (ctx, failures) = context_with(
            Arc::new(StubPrimitives),
            PipelineConfig::default(),
        );
        let out = drive(&Fan2HashStage::new(), ctx, vec![Value::from("7")]).await.unwrap();

        assert!(out.is_empty());
        assert_eq!(failures.snapshot()[0].error_kind, "type_mismatch");
    }
}
