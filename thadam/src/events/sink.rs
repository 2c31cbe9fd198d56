//! Event sink trait and implementations.

use super::LifecycleEvent;
use async_trait::async_trait;
use tracing::{debug, info, Level};

/// Receives lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: LifecycleEvent);

    /// Emits an event without awaiting.
    ///
    /// Implementations must not panic; failures are logged and dropped.
    fn try_emit(&self, event: LifecycleEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: LifecycleEvent) {}

    fn try_emit(&self, _event: LifecycleEvent) {}
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &LifecycleEvent) {
        let job_id = event.job_id();
        if self.level == Level::DEBUG {
            debug!(event_type = event.kind(), %job_id, event = ?event, "Event: {}", event.kind());
        } else {
            info!(event_type = event.kind(), %job_id, event = ?event, "Event: {}", event.kind());
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: LifecycleEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: LifecycleEvent) {
        self.log_event(&event);
    }
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<LifecycleEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.read().clone()
    }

    /// Returns the event types in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.read().iter().map(LifecycleEvent::kind).collect()
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

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind().starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: LifecycleEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: LifecycleEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobId;

    fn started(stage: &str) -> LifecycleEvent {
        LifecycleEvent::StageStarted {
            job_id: JobId::new(),
            stage: stage.to_string(),
        }
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit(started("a")).await;
        let sink = LoggingEventSink::debug();
        sink.emit(started("a")).await;
        sink.try_emit(started("b"));
    }

    #[tokio::test]
    async fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(started("recognize")).await;
        sink.try_emit(LifecycleEvent::JobQueued {
            job_id: JobId::new(),
            category: None,
        });

        assert_eq!(sink.kinds(), vec!["stage.started", "job.queued"]);
        assert_eq!(sink.events_of_type("stage.").len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
