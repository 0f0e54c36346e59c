//! Concurrent pipeline executor.
//!
//! Every stage runs as its own task. Adjacent stages are joined by a queue
//! whose only writer is the upstream stage, so the queue closes exactly once,
//! when that stage returns. The run ends when every stage has closed its
//! output and the last queue has been drained.

use super::PipelineRun;
use crate::cancellation::{CancellationToken, StageTaskGroup};
use crate::config::PipelineConfig;
use crate::context::{FailureLog, StageContext};
use crate::core::{StageState, Value};
use crate::errors::HashflowError;
use crate::events::{EventKind, EventSink, PipelineEvent};
use crate::gate::HashGate;
use crate::observability::SpanTimer;
use crate::queue::{queue, QueueReceiver, QueueSender};
use crate::stages::Stage;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A validated, runnable pipeline.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder). A pipeline can be
/// run any number of times; each run gets fresh queues and a fresh
/// cancellation token but shares the gate.
pub struct Pipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    config: Arc<PipelineConfig>,
    gate: Arc<HashGate>,
    events: Arc<dyn EventSink>,
}

impl Pipeline {
    pub(crate) fn new(
        name: String,
        stages: Vec<Arc<dyn Stage>>,
        config: Arc<PipelineConfig>,
        gate: Arc<HashGate>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name,
            stages,
            config,
            gate,
            events,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in pipeline order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the hash gate shared by every run.
    #[must_use]
    pub fn gate(&self) -> &Arc<HashGate> {
        &self.gate
    }

    /// Creates an input queue sized by the pipeline's configuration.
    ///
    /// Pass the receiver to [`run_stream`](Self::run_stream) and feed the
    /// sender; dropping the sender ends the input.
    #[must_use]
    pub fn input_queue(&self) -> (QueueSender, QueueReceiver) {
        queue(self.config.queue_capacity)
    }

    /// Runs the pipeline over a finite sequence of inputs.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure. Per-item failures under the skip
    /// policy are reported in [`PipelineRun::failures`] instead.
    pub async fn run<I, V>(&self, inputs: I) -> Result<PipelineRun, HashflowError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let inputs: Vec<Value> = inputs.into_iter().map(Into::into).collect();
        let (tx, rx) = self.input_queue();
        self.execute(rx, Some((tx, inputs))).await
    }

    /// Runs the pipeline over a live input queue until it is closed.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure.
    pub async fn run_stream(&self, input: QueueReceiver) -> Result<PipelineRun, HashflowError> {
        self.execute(input, None).await
    }

    /// Runs the pipeline and returns its single text output.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure, or
    /// [`HashflowError::UnexpectedOutput`] if the run did not produce exactly
    /// one text value.
    pub async fn run_to_string<I, V>(&self, inputs: I) -> Result<String, HashflowError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let run = self.run(inputs).await?;
        run.single_text().map(str::to_string)
    }

    async fn execute(
        &self,
        input: QueueReceiver,
        feed: Option<(QueueSender, Vec<Value>)>,
    ) -> Result<PipelineRun, HashflowError> {
        let run_id = Uuid::new_v4();
        let timer = SpanTimer::start(&self.name);
        let cancel = CancellationToken::new();
        let failures = Arc::new(FailureLog::new());
        let group = StageTaskGroup::new(cancel.clone());

        info!(
            run_id = %run_id,
            pipeline = %self.name,
            stages = self.stages.len(),
            "pipeline started"
        );
        self.events.emit(
            PipelineEvent::new(run_id, EventKind::PipelineStarted).with_detail(serde_json::json!({
                "pipeline": self.name,
                "stages": self.stage_names(),
            })),
        );

        if let Some((tx, values)) = feed {
            let token = cancel.clone();
            group.spawn("input", feed_inputs(tx, values, token));
        }

        let mut upstream = input;
        let mut contexts = Vec::with_capacity(self.stages.len());
        for (position, stage) in self.stages.iter().enumerate() {
            let (tx, rx) = queue(self.config.queue_capacity);
            let stage_input = std::mem::replace(&mut upstream, rx);
            let ctx = StageContext::new(
                run_id,
                stage.name(),
                position,
                self.gate.clone(),
                self.config.clone(),
                cancel.clone(),
                self.events.clone(),
                failures.clone(),
            );
            contexts.push(ctx.clone());

            let span = info_span!("stage", run_id = %run_id, stage = %stage.name(), position);
            group.spawn(
                stage.name(),
                run_stage(stage.clone(), ctx, stage_input, tx).instrument(span),
            );
        }

        let (joined, outputs) = tokio::join!(group.wait(), drain(upstream));
        let duration_ms = timer.finish();

        let stage_states = contexts
            .iter()
            .map(|ctx| (ctx.stage_name().to_string(), ctx.state()))
            .collect();

        if let Err(e) = joined {
            warn!(
                run_id = %run_id,
                pipeline = %self.name,
                error = %e,
                duration_ms,
                "pipeline failed"
            );
            let detail = serde_json::json!({
                "error": e.to_string(),
                "kind": e.kind(),
                "duration_ms": duration_ms,
            });
            self.events
                .emit(PipelineEvent::new(run_id, EventKind::PipelineFailed).with_detail(detail));
            return Err(e);
        }

        let failures = failures.snapshot();
        info!(
            run_id = %run_id,
            pipeline = %self.name,
            outputs = outputs.len(),
            skipped = failures.len(),
            duration_ms,
            "pipeline completed"
        );
        self.events.emit(
            PipelineEvent::new(run_id, EventKind::PipelineCompleted).with_detail(serde_json::json!({
                "outputs": outputs.len(),
                "skipped": failures.len(),
                "duration_ms": duration_ms,
            })),
        );

        Ok(PipelineRun {
            run_id,
            pipeline: self.name.clone(),
            outputs,
            failures,
            stage_states,
            duration_ms,
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Writes `values` into the first queue, then closes it.
async fn feed_inputs(
    tx: QueueSender,
    values: Vec<Value>,
    cancel: CancellationToken,
) -> Result<(), HashflowError> {
    let total = values.len();
    for value in values {
        tokio::select! {
            sent = tx.send(value) => {
                if sent.is_err() {
                    return Err(HashflowError::Cancelled("first stage stopped reading".to_string()));
                }
            }
            () = cancel.cancelled() => {
                return Err(HashflowError::Cancelled(cancel.reason().unwrap_or_default()));
            }
        }
    }
    debug!(values = total, "input closed");
    Ok(())
}

/// Runs one stage and drives its lifecycle.
///
/// `output` is moved into the stage, so the downstream queue is closed as
/// soon as the stage returns, whether it succeeded or not.
async fn run_stage(
    stage: Arc<dyn Stage>,
    ctx: StageContext,
    input: QueueReceiver,
    output: QueueSender,
) -> Result<(), HashflowError> {
    let timer = SpanTimer::start(stage.name());
    ctx.transition(StageState::Running);

    let result = stage.run(ctx.clone(), input, output).await;
    ctx.transition(StageState::Closed);

    match &result {
        Ok(()) => debug!(duration_ms = timer.finish(), "stage closed"),
        Err(HashflowError::Cancelled(reason)) => {
            debug!(duration_ms = timer.finish(), reason = %reason, "stage stopped by cancellation");
        }
        Err(e) => warn!(duration_ms = timer.finish(), error = %e, "stage failed"),
    }
    result
}

/// Collects everything the last stage writes.
async fn drain(mut output: QueueReceiver) -> Vec<Value> {
    let mut values = Vec::new();
    while let Some(value) = output.recv().await {
        values.push(value);
    }
    values
}
