//! Domain event system: decoupled instrumentation of plan execution.
//!
//! The engine publishes an event whenever a plan is parsed or a step changes
//! state. Subscribers (progress printers, test probes, metrics exporters)
//! attach and detach freely; with no subscribers publishing is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A plan text was parsed into steps
    PlanParsed {
        steps: usize,
        diagnostics: usize,
        timestamp: DateTime<Utc>,
    },

    /// A step finished substitution and is about to invoke its tool
    StepStarted {
        index: usize,
        tool: String,
        arguments: String,
        timestamp: DateTime<Utc>,
    },

    /// A step's tool returned an observation
    StepCompleted {
        index: usize,
        tool: String,
        observation_preview: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A step's tool invocation failed (after any retries)
    StepFailed {
        index: usize,
        tool: String,
        error_message: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A back-reference token was passed through literally
    UnresolvedReference {
        index: usize,
        token: String,
        timestamp: DateTime<Utc>,
    },

    /// An execution pass ended
    PlanCompleted {
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short machine-readable name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PlanParsed { .. } => "plan_parsed",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepFailed { .. } => "step_failed",
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::PlanCompleted { .. } => "plan_completed",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::StepCompleted {
            index: 3,
            tool: "search".into(),
            observation_preview: "100".into(),
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::StepCompleted { index, tool, .. } => {
                assert_eq!(*index, 3);
                assert_eq!(tool, "search");
            }
            _ => panic!("Expected StepCompleted event"),
        }
        assert_eq!(event.event_type(), "step_completed");
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::PlanCompleted {
            succeeded: 0,
            failed: 0,
            duration_ms: 0,
            timestamp: Utc::now(),
        });
    }
}
