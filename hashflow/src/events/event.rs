//! Pipeline event type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A run began.
    PipelineStarted,
    /// A stage began reading its input.
    StageStarted,
    /// A stage's input closed; in-flight work is finishing.
    StageDraining,
    /// A stage closed its output.
    StageClosed,
    /// One item failed and was skipped.
    ItemFailed,
    /// A run finished successfully.
    PipelineCompleted,
    /// A run finished with an error.
    PipelineFailed,
}

impl EventKind {
    /// Dotted name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::StageStarted => "stage.started",
            Self::StageDraining => "stage.draining",
            Self::StageClosed => "stage.closed",
            Self::ItemFailed => "item.failed",
            Self::PipelineCompleted => "pipeline.completed",
            Self::PipelineFailed => "pipeline.failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The run this event belongs to.
    pub run_id: Uuid,
    /// What happened.
    pub kind: EventKind,
    /// The stage involved, if any.
    pub stage: Option<String>,
    /// The item index involved, if any.
    pub item: Option<u64>,
    /// Free-form details.
    pub detail: Option<serde_json::Value>,
    /// When it happened.
    pub at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(run_id: Uuid, kind: EventKind) -> Self {
        Self {
            run_id,
            kind,
            stage: None,
            item: None,
            detail: None,
            at: Utc::now(),
        }
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the item index.
    #[must_use]
    pub fn with_item(mut self, item: u64) -> Self {
        self.item = Some(item);
        self
    }

    /// Sets the details.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}
