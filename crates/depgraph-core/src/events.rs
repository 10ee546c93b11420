use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// The closed set of events the engine emits (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RollupCreated,
    RollupUpdated,
    RollupDeleted,
    RollupExecutionStarted,
    RollupExecutionCompleted,
    RollupExecutionFailed,
}

impl EventType {
    pub fn label(&self) -> &'static str {
        match self {
            EventType::RollupCreated => "rollup.created",
            EventType::RollupUpdated => "rollup.updated",
            EventType::RollupDeleted => "rollup.deleted",
            EventType::RollupExecutionStarted => "rollup.execution.started",
            EventType::RollupExecutionCompleted => "rollup.execution.completed",
            EventType::RollupExecutionFailed => "rollup.execution.failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub rollup_id: String,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// Delivery collaborator for emitted events (spec §6: "delivered through an
/// `EventSink` trait; a real pub-sub bus is the external collaborator").
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// In-memory sink used by tests and the CLI.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: Event) {
        tracing::debug!(event = event.event_type.label(), rollup_id = %event.rollup_id, "emitting event");
        self.events.lock().unwrap().push(event);
    }
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sink_records_events_in_order() {
        let sink = InMemoryEventSink::default();
        sink.emit(Event { event_type: EventType::RollupCreated, rollup_id: "r1".into(), tenant_id: "t1".into(), timestamp: Utc::now(), data: json!({}) });
        sink.emit(Event { event_type: EventType::RollupExecutionStarted, rollup_id: "r1".into(), tenant_id: "t1".into(), timestamp: Utc::now(), data: json!({}) });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.label(), "rollup.created");
    }
}
