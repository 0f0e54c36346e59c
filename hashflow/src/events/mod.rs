//! Lifecycle events emitted while a pipeline runs.
//!
//! Stages and the executor report what they are doing to an [`EventSink`].
//! The default sink logs through `tracing`; tests collect events in memory.

mod event;
mod sink;

pub use event::{EventKind, PipelineEvent};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
