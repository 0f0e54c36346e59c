//! Per-stage execution context.

use super::{FailureLog, FailureRecord};
use crate::cancellation::CancellationToken;
use crate::config::{ItemFailurePolicy, PipelineConfig};
use crate::core::{StageState, StageStateCell};
use crate::errors::HashflowError;
use crate::events::{EventKind, EventSink, PipelineEvent};
use crate::gate::HashGate;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Everything a stage needs from the run it belongs to.
///
/// Cheap to clone; clones share the run's gate, token, sinks and the
/// stage's state cell.
#[derive(Clone)]
pub struct StageContext {
    run_id: Uuid,
    stage_name: String,
    position: usize,
    gate: Arc<HashGate>,
    config: Arc<PipelineConfig>,
    cancel: CancellationToken,
    events: Arc<dyn EventSink>,
    failures: Arc<FailureLog>,
    state: Arc<StageStateCell>,
}

impl StageContext {
    /// Creates a context for the stage at `position`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        run_id: Uuid,
        stage_name: impl Into<String>,
        position: usize,
        gate: Arc<HashGate>,
        config: Arc<PipelineConfig>,
        cancel: CancellationToken,
        events: Arc<dyn EventSink>,
        failures: Arc<FailureLog>,
    ) -> Self {
        Self {
            run_id,
            stage_name: stage_name.into(),
            position,
            gate,
            config,
            cancel,
            events,
            failures,
            state: Arc::new(StageStateCell::new()),
        }
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// The stage's position in the pipeline.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The hash gate shared by the run.
    #[must_use]
    pub fn gate(&self) -> &Arc<HashGate> {
        &self.gate
    }

    /// The run's configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true if the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Builds the error a stage returns when it stops because of cancellation.
    #[must_use]
    pub fn cancelled_error(&self) -> HashflowError {
        HashflowError::Cancelled(
            self.cancel
                .reason()
                .unwrap_or_else(|| format!("stage '{}' stopped", self.stage_name)),
        )
    }

    /// The stage's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.state.get()
    }

    /// Advances the stage's state and emits the matching event.
    pub fn transition(&self, next: StageState) {
        if !self.state.advance(next) {
            return;
        }
        let kind = match next {
            StageState::Created => return,
            StageState::Running => EventKind::StageStarted,
            StageState::Draining => EventKind::StageDraining,
            StageState::Closed => EventKind::StageClosed,
        };
        self.emit(PipelineEvent::new(self.run_id, kind).with_stage(&self.stage_name));
    }

    /// Emits an event to the run's sink.
    pub fn emit(&self, event: PipelineEvent) {
        self.events.emit(event);
    }

    /// Applies the failure policy to one failed item.
    ///
    /// Returns `Ok(())` if the item was recorded and skipped, or the error
    /// if the stage must stop. Cancellation always stops the stage.
    pub fn handle_item_failure(
        &self,
        item: u64,
        error: HashflowError,
    ) -> Result<(), HashflowError> {
        if matches!(error, HashflowError::Cancelled(_))
            || self.config.failure_policy == ItemFailurePolicy::FailFast
        {
            return Err(error);
        }

        warn!(
            run_id = %self.run_id,
            stage = %self.stage_name,
            item,
            error = %error,
            "item failed; skipping"
        );
        self.emit(
            PipelineEvent::new(self.run_id, EventKind::ItemFailed)
                .with_stage(&self.stage_name)
                .with_item(item)
                .with_detail(serde_json::json!({
                    "error": error.to_string(),
                    "kind": error.kind(),
                })),
        );
        self.failures
            .record(FailureRecord::new(&self.stage_name, item, &error));
        Ok(())
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("run_id", &self.run_id)
            .field("stage_name", &self.stage_name)
            .field("position", &self.position)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
