//! Stage trait and implementations.
//!
//! A stage reads values from its input queue until that queue is closed and
//! drained, writes values to its output queue, and returns. The executor
//! closes the output queue when `run` returns, by dropping the sender.

mod fan2;
mod fan6;
mod fan_out;
mod sort_join;

pub use fan2::Fan2HashStage;
pub use fan6::{Fan6HashStage, FAN6_WIDTH};
pub use fan_out::{FanOut, Resequencer};
pub use sort_join::SortJoinStage;

use crate::context::StageContext;
use crate::core::{StageState, Value, ValueKind};
use crate::errors::HashflowError;
use crate::queue::{QueueReceiver, QueueSender};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// The kind of value the stage reads.
    fn input_kind(&self) -> ValueKind;

    /// The kind of value the stage writes.
    fn output_kind(&self) -> ValueKind;

    /// Runs the stage to completion.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The stage's view of the run
    /// * `input` - The queue to read until closed
    /// * `output` - The queue to write; dropped by the caller afterwards
    async fn run(
        &self,
        ctx: StageContext,
        input: QueueReceiver,
        output: QueueSender,
    ) -> Result<(), HashflowError>;
}

/// Receives the next input value, or stops on cancellation.
///
/// Returns `Ok(None)` once the input is closed and drained.
pub(crate) async fn next_input(
    ctx: &StageContext,
    input: &mut QueueReceiver,
) -> Result<Option<Value>, HashflowError> {
    tokio::select! {
        value = input.recv() => Ok(value),
        () = ctx.cancel_token().cancelled() => Err(ctx.cancelled_error()),
    }
}

/// Sends a value downstream.
pub(crate) async fn send_output(
    ctx: &StageContext,
    output: &QueueSender,
    value: Value,
) -> Result<(), HashflowError> {
    tokio::select! {
        sent = output.send(value) => sent.map_err(|_| {
            HashflowError::Cancelled(format!("downstream of '{}' closed", ctx.stage_name()))
        }),
        () = ctx.cancel_token().cancelled() => Err(ctx.cancelled_error()),
    }
}

/// Rejects a value whose kind the stage does not accept.
pub(crate) fn expect_kind(
    stage: &str,
    expected: ValueKind,
    value: &Value,
) -> Result<(), HashflowError> {
    if expected.feeds(value.kind()) {
        Ok(())
    } else {
        Err(HashflowError::TypeMismatch {
            stage: stage.to_string(),
            expected,
            found: value.kind(),
        })
    }
}

/// A stage that maps each item through a synchronous function.
///
/// Failed items follow the run's failure policy.
pub struct FnStage<F>
where
    F: Fn(Value) -> Result<Value, HashflowError> + Send + Sync,
{
    name: String,
    input_kind: ValueKind,
    output_kind: ValueKind,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(Value) -> Result<Value, HashflowError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(
        name: impl Into<String>,
        input_kind: ValueKind,
        output_kind: ValueKind,
        func: F,
    ) -> Self {
        Self {
            name: name.into(),
            input_kind,
            output_kind,
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(Value) -> Result<Value, HashflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("input_kind", &self.input_kind)
            .field("output_kind", &self.output_kind)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(Value) -> Result<Value, HashflowError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> ValueKind {
        self.input_kind
    }

    fn output_kind(&self) -> ValueKind {
        self.output_kind
    }

    async fn run(
        &self,
        ctx: StageContext,
        mut input: QueueReceiver,
        output: QueueSender,
    ) -> Result<(), HashflowError> {
        let mut item: u64 = 0;
        while let Some(value) = next_input(&ctx, &mut input).await? {
            let mapped =
                expect_kind(&self.name, self.input_kind, &value).and_then(|()| (self.func)(value));
            match mapped {
                Ok(value) => send_output(&ctx, &output, value).await?,
                Err(e) => ctx.handle_item_failure(item, e)?,
            }
            item += 1;
        }
        ctx.transition(StageState::Draining);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{drive, stub_context};
    use super::*;
    use pretty_assertions::assert_eq;

    fn doubler() -> FnStage<impl Fn(Value) -> Result<Value, HashflowError> + Send + Sync> {
        FnStage::new("double", ValueKind::Integer, ValueKind::Integer, |v| {
            let n = v.as_integer().ok_or_else(|| HashflowError::Internal("not an integer".into()))?;
            Ok(Value::Integer(n * 2))
        })
    }

    #[tokio::test]
    async fn test_fn_stage_maps_in_order() {
        let stage = doubler();
        assert_eq!(stage.name(), "double");

        let out = drive(&stage, stub_context(), vec![1.into(), 2.into(), 3.into()])
            .await
            .unwrap();
        assert_eq!(out, vec![Value::from(2), Value::from(4), Value::from(6)]);
    }

    #[tokio::test]
    async fn test_fn_stage_skips_wrong_kind() {
        let stage = doubler();
        let ctx = stub_context();
        let state = ctx.clone();

        let out = drive(&stage, ctx, vec![1.into(), "x".into(), 3.into()])
            .await
            .unwrap();

        assert_eq!(out, vec![Value::from(2), Value::from(6)]);
        assert_eq!(state.state(), StageState::Draining);
    }

    #[test]
    fn test_expect_kind() {
        assert!(expect_kind("s", ValueKind::Text, &Value::from("a")).is_ok());
        assert!(expect_kind("s", ValueKind::Any, &Value::from(1)).is_ok());
        assert!(expect_kind("s", ValueKind::Text, &Value::from(1)).is_err());
    }
}
