//! # Hashflow
//!
//! A concurrent staged-pipeline executor.
//!
//! Hashflow runs a linear chain of stages joined by queues. Every stage runs
//! as its own task and every item inside a fan-out stage is processed
//! concurrently, yet results stay deterministic:
//!
//! - **Ordered fan-in**: each item's sub-tasks are tagged and folded in tag
//!   order, whatever order they finish in
//! - **Gated primitives**: all digest and checksum calls share a global
//!   concurrency ceiling, with a tighter one for digests
//! - **Clean shutdown**: a stage closes its output exactly once, and the first
//!   stage failure cancels the whole run
//! - **Lifecycle events**: runs and stages report their progress to an
//!   [`EventSink`](events::EventSink)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hashflow::prelude::*;
//! use std::sync::Arc;
//!
//! let gate = Arc::new(HashGate::with_defaults(Arc::new(Md5Crc32)));
//! let pipeline = signer_pipeline(gate, PipelineConfig::default())?;
//!
//! let signature = pipeline.run_to_string(0..2).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod collector;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod gate;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, StageTaskGroup};
    pub use crate::collector::{CombineRule, OrderedCollector, SubTask, TaskUnit};
    pub use crate::config::{
        GateConfig, ItemFailurePolicy, OrderPolicy, PipelineConfig, QueueCapacity,
    };
    pub use crate::context::{FailureRecord, StageContext};
    pub use crate::core::{StageState, Value, ValueKind};
    pub use crate::errors::{
        CollectError, ContractErrorInfo, HashflowError, PipelineValidationError, PrimitiveError,
    };
    pub use crate::events::{
        CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::gate::{HashGate, HashPrimitives, Md5Crc32, StubPrimitives};
    pub use crate::pipeline::{signer_pipeline, Pipeline, PipelineBuilder, PipelineRun};
    pub use crate::queue::{queue, QueueReceiver, QueueSender};
    pub use crate::stages::{Fan2HashStage, Fan6HashStage, FnStage, SortJoinStage, Stage};
}
