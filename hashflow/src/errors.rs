//! Error types for the hashflow pipeline.
//!
//! Errors fall into three families: primitive failures raised by the hash
//! gate, collection failures raised while folding an item's sub-tasks, and
//! wiring failures raised by the builder before anything runs.

use crate::core::ValueKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for hashflow operations.
#[derive(Debug, Clone, Error)]
pub enum HashflowError {
    /// The pipeline could not be constructed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A hash primitive failed.
    #[error("{0}")]
    Primitive(#[from] PrimitiveError),

    /// An item's sub-tasks could not be collected.
    #[error("{0}")]
    Collect(#[from] CollectError),

    /// A stage received a value of the wrong kind.
    #[error("Stage '{stage}' expected {expected} input, got {found}")]
    TypeMismatch {
        /// The stage name.
        stage: String,
        /// The kind the stage accepts.
        expected: ValueKind,
        /// The kind it received.
        found: ValueKind,
    },

    /// A stage failed outright.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed {
        /// The stage name.
        stage: String,
        /// What went wrong.
        message: String,
    },

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// The pipeline finished but did not produce the expected output shape.
    #[error("Unexpected pipeline output: {0}")]
    UnexpectedOutput(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HashflowError {
    /// Creates a stage failure.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name of the error variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Primitive(_) => "primitive",
            Self::Collect(_) => "collect",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::StageFailed { .. } => "stage_failed",
            Self::Cancelled(_) => "cancelled",
            Self::UnexpectedOutput(_) => "unexpected_output",
            Self::Internal(_) => "internal",
        }
    }
}

/// Failure reported by a hash primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Primitive '{primitive}' failed on {input:?}: {reason}")]
pub struct PrimitiveError {
    /// Which primitive failed ("digest" or "checksum").
    pub primitive: String,
    /// The input it was called with.
    pub input: String,
    /// The reason for failure.
    pub reason: String,
}

impl PrimitiveError {
    /// Creates a new primitive error.
    #[must_use]
    pub fn new(
        primitive: impl Into<String>,
        input: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            primitive: primitive.into(),
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to gather the sub-task results of one item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    /// Fewer units arrived than were spawned.
    #[error("Item {item}: expected {expected} task units, received {received}")]
    CountMismatch {
        /// The item index.
        item: u64,
        /// Number of units expected.
        expected: usize,
        /// Number of units received.
        received: usize,
    },

    /// Two units carried the same sequence number, or one was out of range.
    #[error(
        "Item {item}: task unit sequence {sequence} is duplicated or out of range 0..{expected}"
    )]
    BadSequence {
        /// The item index.
        item: u64,
        /// The offending sequence number.
        sequence: usize,
        /// Number of units expected.
        expected: usize,
    },

    /// The units did not all arrive before the deadline.
    #[error("Item {item}: timed out after {timeout_ms}ms with {received}/{expected} task units")]
    Timeout {
        /// The item index.
        item: u64,
        /// Number of units expected.
        expected: usize,
        /// Number of units received.
        received: usize,
        /// The deadline that expired.
        timeout_ms: u64,
    },
}

/// Metadata about a wiring error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-KIND-MISMATCH").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Error raised when pipeline construction fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Default suggestions for the builder's contract codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONTRACT-EMPTY" => Some("Add at least one stage to the pipeline before building."),
            "CONTRACT-DUPLICATE" => Some(
                "Every stage needs a unique name so logs and reports can tell them apart.",
            ),
            "CONTRACT-KIND-MISMATCH" => Some(
                "Each stage's output kind must match the next stage's input kind. \
                 Insert a converting stage or reorder the stages.",
            ),
            "CONTRACT-CAPACITY" => Some(
                "Bounded queues need a capacity of at least 1. \
                 Use Unbounded to disable backpressure.",
            ),
            _ => None,
        }
    }
}
