//! Event bus: fans out every `Event` to whichever sinks are
//! registered — the session store, a tracer, analytics, a UI callback.
//! Sinks are best-effort: a failing sink is logged and does not stop the
//! others from receiving the event or the run from continuing.

use async_trait::async_trait;
use tracing::warn;

use super::event::Event;

/// Something that wants to observe every event as it is emitted.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, event: &Event);
}

/// Fan-out broadcaster. Cloning an `EventBus` shares the same sink list.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: std::sync::Arc<std::sync::RwLock<Vec<std::sync::Arc<dyn EventSink>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: std::sync::Arc<dyn EventSink>) {
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(sink),
            Err(poisoned) => poisoned.into_inner().push(sink),
        }
    }

    /// Emit one event to every registered sink. Never returns an error —
    /// a sink observing events is not allowed to affect the run.
    pub async fn emit(&self, event: Event) {
        let sinks: Vec<_> = match self.sinks.read() {
            Ok(sinks) => sinks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for sink in sinks {
            sink.on_event(&event).await;
        }
    }
}

/// Sink that records every event it sees, for tests and for in-process
/// inspection (e.g. a TUI feed).
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn on_event(&self, event: &Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Sink that logs every event at `debug` level, grounding the bus's
/// default observability surface the way other components log theirs.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn on_event(&self, event: &Event) {
        tracing::debug!(
            event_type = ?event.event_type,
            session_id = %event.session_id,
            agent_id = ?event.agent_id,
            "EventBus: event emitted"
        );
    }
}

/// Used when a sink implementation is missing or misconfigured at startup;
/// logs a warning once rather than silently dropping events.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn on_event(&self, _event: &Event) {
        warn!("EventBus: NullSink received an event, no-op by design");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::event::EventType;
    use std::sync::Arc;

    #[tokio::test]
    async fn emit_reaches_every_registered_sink() {
        let bus = EventBus::new();
        let sink_a = Arc::new(RecordingSink::new());
        let sink_b = Arc::new(RecordingSink::new());
        bus.register(sink_a.clone());
        bus.register(sink_b.clone());

        bus.emit(Event::new(EventType::AgentStart, "sess-1")).await;

        assert_eq!(sink_a.events().len(), 1);
        assert_eq!(sink_b.events().len(), 1);
    }

    #[tokio::test]
    async fn cloned_bus_shares_the_sink_list() {
        let bus = EventBus::new();
        let sink = Arc::new(RecordingSink::new());
        bus.register(sink.clone());

        let cloned = bus.clone();
        cloned.emit(Event::new(EventType::AgentEnd, "sess-1")).await;

        assert_eq!(sink.events().len(), 1);
    }
}
