//! Helper stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use crate::context::StageContext;
use crate::core::{StageState, Value, ValueKind};
use crate::errors::HashflowError;
use crate::queue::{QueueReceiver, QueueSender};
use crate::stages::{next_input, send_output, Stage};

/// A pass-through stage that remembers every value it saw.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    seen: Mutex<Vec<Value>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the values seen so far, in arrival order.
    #[must_use]
    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    async fn run(
        &self,
        ctx: StageContext,
        mut input: QueueReceiver,
        output: QueueSender,
    ) -> Result<(), HashflowError> {
        while let Some(value) = next_input(&ctx, &mut input).await? {
            self.seen.lock().push(value.clone());
            send_output(&ctx, &output, value).await?;
        }
        ctx.transition(StageState::Draining);
        Ok(())
    }
}

/// A pass-through stage that fails the whole stage after `fail_after` items.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    fail_after: usize,
    message: String,
}

impl FailingStage {
    /// Creates a stage that fails on its first item.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_after: 0,
            message: message.into(),
        }
    }

    /// Forwards `n` items before failing.
    #[must_use]
    pub fn after(mut self, n: usize) -> Self {
        self.fail_after = n;
        self
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    async fn run(
        &self,
        ctx: StageContext,
        mut input: QueueReceiver,
        output: QueueSender,
    ) -> Result<(), HashflowError> {
        let mut forwarded = 0;
        while let Some(value) = next_input(&ctx, &mut input).await? {
            if forwarded >= self.fail_after {
                return Err(HashflowError::stage_failed(&self.name, &self.message));
            }
            send_output(&ctx, &output, value).await?;
            forwarded += 1;
        }
        ctx.transition(StageState::Draining);
        Ok(())
    }
}

/// A pass-through stage that sleeps before forwarding each item.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    async fn run(
        &self,
        ctx: StageContext,
        mut input: QueueReceiver,
        output: QueueSender,
    ) -> Result<(), HashflowError> {
        while let Some(value) = next_input(&ctx, &mut input).await? {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => {}
                () = ctx.cancel_token().cancelled() => return Err(ctx.cancelled_error()),
            }
            send_output(&ctx, &output, value).await?;
        }
        ctx.transition(StageState::Draining);
        Ok(())
    }
}
