//! Terminal reducer: sort everything, join once.

use super::{expect_kind, next_input, send_output, Stage};
use crate::context::StageContext;
use crate::core::{StageState, Value, ValueKind};
use crate::errors::HashflowError;
use crate::queue::{QueueReceiver, QueueSender};
use async_trait::async_trait;
use tracing::debug;

/// Collects every input string, sorts them bytewise and emits one joined string.
///
/// Nothing is emitted until the input is closed and drained.
#[derive(Debug, Clone)]
pub struct SortJoinStage {
    name: String,
    separator: String,
}

impl SortJoinStage {
    /// Creates the stage with name `sort_join` and separator `_`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "sort_join".to_string(),
            separator: "_".to_string(),
        }
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the separator.
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Sorts and joins `values`.
    #[must_use]
    pub fn combine(&self, mut values: Vec<String>) -> String {
        values.sort_unstable();
        values.join(&self.separator)
    }
}

impl Default for SortJoinStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for SortJoinStage {
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
        mut input: QueueReceiver,
        output: QueueSender,
    ) -> Result<(), HashflowError> {
        let mut collected = Vec::new();
        let mut item: u64 = 0;

        while let Some(value) = next_input(&ctx, &mut input).await? {
            match expect_kind(&self.name, ValueKind::Text, &value) {
                Ok(()) => collected.extend(value.into_text()),
                Err(e) => ctx.handle_item_failure(item, e)?,
            }
            item += 1;
        }
        ctx.transition(StageState::Draining);

        let count = collected.len();
        let joined = self.combine(collected);
        debug!(stage = %self.name, count, result = %joined, "combined results");
        send_output(&ctx, &output, Value::Text(joined)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{drive, stub_context};
    use pretty_assertions::assert_eq;

    fn texts(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[tokio::test]
    async fn test_sorts_and_joins() {
        let out = drive(&SortJoinStage::new(), stub_context(), texts(&["b", "c", "a"]))
            .await
            .unwrap();
        assert_eq!(out, vec![Value::from("a_b_c")]);
    }

    #[tokio::test]
    async fn test_permutation_invariant() {
        let forward = drive(&SortJoinStage::new(), stub_context(), texts(&["x1", "A", "x10", "b"]))
            .await
            .unwrap();
        let shuffled = drive(&SortJoinStage::new(), stub_context(), texts(&["b", "x10", "x1", "A"]))
            .await
            .unwrap();
        assert_eq!(forward, shuffled);
        // Bytewise: uppercase before lowercase.
        assert_eq!(forward, vec![Value::from("A_b_x1_x10")]);
    }

    #[tokio::test]
    async fn test_round_trip_split() {
        let inputs = ["delta", "alpha", "charlie", "bravo"];
        let out = drive(&SortJoinStage::new(), stub_context(), texts(&inputs))
            .await
            .unwrap();

        let mut split: Vec<&str> = out[0].as_text().unwrap().split('_').collect();
        split.sort_unstable();
        let mut expected = inputs.to_vec();
        expected.sort_unstable();
        assert_eq!(split, expected);
    }

    #[tokio::test]
    async fn test_empty_input_emits_one_empty_value() {
        let out = drive(&SortJoinStage::new(), stub_context(), Vec::new()).await.unwrap();
        assert_eq!(out, vec![Value::from("")]);
    }

    #[tokio::test]
    async fn test_custom_separator() {
        let stage = SortJoinStage::new().with_separator(",").with_name("csv");
        assert_eq!(stage.name(), "csv");
        assert_eq!(stage.combine(vec!["2".into(), "1".into()]), "1,2");
    }
}
