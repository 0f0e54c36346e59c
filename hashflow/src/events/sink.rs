//! Event sink trait and implementations.

use super::{EventKind, PipelineEvent};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Receives lifecycle events.
///
/// `emit` is called from stage tasks and must not block.
pub trait EventSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: PipelineEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// A sink that logs events using the tracing framework.
///
/// Failures log at `warn`, run boundaries at `info`, everything else at
/// `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: PipelineEvent) {
        let stage = event.stage.as_deref().unwrap_or("-");
        match event.kind {
            EventKind::ItemFailed | EventKind::PipelineFailed => warn!(
                run_id = %event.run_id,
                stage,
                item = ?event.item,
                detail = ?event.detail,
                "{}", event.kind
            ),
            EventKind::PipelineStarted | EventKind::PipelineCompleted => info!(
                run_id = %event.run_id,
                detail = ?event.detail,
                "{}", event.kind
            ),
            _ => debug!(
                run_id = %event.run_id,
                stage,
                "{}", event.kind
            ),
        }
    }
}

/// A sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_noop_and_logging_sinks_accept_events() {
        let event = PipelineEvent::new(Uuid::new_v4(), EventKind::ItemFailed)
            .with_stage("fan2_hash")
            .with_item(4);
        NoOpEventSink.emit(event.clone());
        LoggingEventSink.emit(event);
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        let run_id = Uuid::new_v4();
        sink.emit(PipelineEvent::new(run_id, EventKind::StageStarted).with_stage("a"));
        sink.emit(PipelineEvent::new(run_id, EventKind::StageClosed).with_stage("a"));
        sink.emit(PipelineEvent::new(run_id, EventKind::StageStarted).with_stage("b"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.of_kind(EventKind::StageStarted).len(), 2);
        assert_eq!(sink.events()[1].kind.as_str(), "stage.closed");
    }
}
