//! Result of one pipeline run.

use crate::context::FailureRecord;
use crate::core::{StageState, Value};
use crate::errors::HashflowError;
use serde::Serialize;
use uuid::Uuid;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    /// The run id.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// Values written by the last stage, in arrival order.
    pub outputs: Vec<Value>,
    /// Items that were skipped, in the order they failed.
    pub failures: Vec<FailureRecord>,
    /// Final state of every stage, in pipeline order.
    pub stage_states: Vec<(String, StageState)>,
    /// Wall-clock duration of the run.
    pub duration_ms: f64,
}

impl PipelineRun {
    /// Returns true if no item was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the single text value the run produced.
    ///
    /// # Errors
    ///
    /// Returns [`HashflowError::UnexpectedOutput`] unless the run wrote
    /// exactly one text value.
    pub fn single_text(&self) -> Result<&str, HashflowError> {
        match self.outputs.as_slice() {
            [Value::Text(text)] => Ok(text),
            [other] => Err(HashflowError::UnexpectedOutput(format!(
                "expected one text value, got {}",
                other.kind()
            ))),
            outputs => Err(HashflowError::UnexpectedOutput(format!(
                "expected one text value, got {} values",
                outputs.len()
            ))),
        }
    }

    /// Converts to a JSON summary.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(outputs: Vec<Value>) -> PipelineRun {
        PipelineRun {
            run_id: Uuid::new_v4(),
            pipeline: "signer".to_string(),
            outputs,
            failures: Vec::new(),
            stage_states: vec![("sort_join".to_string(), StageState::Closed)],
            duration_ms: 1.5,
        }
    }

    #[test]
    fn test_single_text() {
        let run = run_with(vec![Value::from("abc")]);
        assert_eq!(run.single_text().unwrap(), "abc");
        assert!(run.is_clean());
    }

    #[test]
    fn test_single_text_rejects_other_shapes() {
        assert!(run_with(Vec::new()).single_text().is_err());
        assert!(run_with(vec![Value::from(1)]).single_text().is_err());

        let err = run_with(vec![Value::from("a"), Value::from("b")])
            .single_text()
            .unwrap_err();
        assert_eq!(err.kind(), "unexpected_output");
    }

    #[test]
    fn test_to_json() {
        let json = run_with(vec![Value::from("abc")]).to_json();
        assert_eq!(json["pipeline"], "signer");
        assert_eq!(json["stage_states"][0][0], "sort_join");
    }
}
