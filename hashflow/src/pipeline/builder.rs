//! Pipeline builder with validation.

use super::Pipeline;
use crate::config::{PipelineConfig, QueueCapacity};
use crate::errors::{ContractErrorInfo, ContractSuggestions, PipelineValidationError};
use crate::events::{EventSink, LoggingEventSink};
use crate::gate::{HashGate, Md5Crc32};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added. Every wiring problem is reported
/// by [`build`](Self::build), before any stage starts.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    config: PipelineConfig,
    gate: Option<Arc<HashGate>>,
    events: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            config: PipelineConfig::default(),
            gate: None,
            events: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<S: Stage + 'static>(self, stage: S) -> Self {
        self.shared_stage(Arc::new(stage))
    }

    /// Appends a stage that is already shared.
    #[must_use]
    pub fn shared_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the hash gate. Defaults to MD5/CRC-32 behind default limits.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<HashGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sets the event sink. Defaults to [`LoggingEventSink`].
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
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

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is empty, two stages share a name,
    /// adjacent stages disagree on value kinds, or a capacity is zero.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        self.validate()?;

        let gate = self
            .gate
            .unwrap_or_else(|| Arc::new(HashGate::with_defaults(Arc::new(Md5Crc32))));
        let events = self.events.unwrap_or_else(|| Arc::new(LoggingEventSink));

        Ok(Pipeline::new(
            self.name,
            self.stages,
            Arc::new(self.config),
            gate,
            events,
        ))
    }

    fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            let message = format!("Pipeline '{}' has no stages", self.name);
            return Err(PipelineValidationError::new(message)
                .with_error_info(contract_info("CONTRACT-EMPTY", "Empty pipeline")));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage name '{}' is used more than once",
                    stage.name()
                ))
                .with_stages(vec![stage.name().to_string()])
                .with_error_info(contract_info("CONTRACT-DUPLICATE", "Duplicate stage name")));
            }
        }

        for pair in self.stages.windows(2) {
            let (upstream, downstream) = (&pair[0], &pair[1]);
            if !upstream.output_kind().feeds(downstream.input_kind()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' writes {} values but '{}' reads {}",
                    upstream.name(),
                    upstream.output_kind(),
                    downstream.name(),
                    downstream.input_kind()
                ))
                .with_stages(vec![upstream.name().to_string(), downstream.name().to_string()])
                .with_error_info(
                    contract_info(
                        "CONTRACT-KIND-MISMATCH",
                        "Adjacent stages disagree on value kind",
                    )
                    .with_context_entry("upstream_output", upstream.output_kind().to_string())
                    .with_context_entry("downstream_input", downstream.input_kind().to_string()),
                ));
            }
        }

        if self.config.queue_capacity == QueueCapacity::Bounded(0) {
            return Err(PipelineValidationError::new("Bounded queue capacity must be at least 1")
                .with_error_info(contract_info("CONTRACT-CAPACITY", "Zero queue capacity")));
        }
        if self.config.max_items_in_flight == 0 {
            return Err(PipelineValidationError::new("max_items_in_flight must be at least 1")
                .with_error_info(contract_info("CONTRACT-CAPACITY", "Zero in-flight items")));
        }

        Ok(())
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds contract info with the default fix hint for `code`.
fn contract_info(code: &str, summary: &str) -> ContractErrorInfo {
    let info = ContractErrorInfo::new(code, summary);
    match ContractSuggestions::get(code) {
        Some(hint) => info.with_fix_hint(hint),
        None => info,
    }
}
