//! Event types for fleet observability
//!
//! Events provide a unified stream of controller lifecycle activities.

use crate::{ControllerName, RoomId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all fleet events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// The actual event
    pub event: FleetEvent,
}

impl FleetEventEnvelope {
    pub fn new(event: FleetEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity: event.severity(),
            event,
        }
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Fleet lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    ControllerCreated {
        name: ControllerName,
        rooms: Vec<RoomId>,
        port: u16,
    },
    ControllerUpdated {
        name: ControllerName,
        added: Vec<RoomId>,
        removed: Vec<RoomId>,
    },
    ControllerRestarted {
        name: ControllerName,
        rooms: Vec<RoomId>,
        reason: String,
    },
    ControllerRemoved {
        name: ControllerName,
    },
    ControllerRecovered {
        name: ControllerName,
        rooms: Vec<RoomId>,
    },
    OperationFailed {
        name: ControllerName,
        operation: String,
        reason: String,
    },
    ReconcileSkipped {
        reason: String,
    },
    ReconcileCompleted {
        controllers: usize,
        rooms: usize,
    },
}

impl FleetEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            FleetEvent::OperationFailed { .. } => EventSeverity::Error,
            FleetEvent::ControllerRestarted { .. } | FleetEvent::ReconcileSkipped { .. } => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_inherits_severity() {
        let env = FleetEventEnvelope::new(FleetEvent::ReconcileSkipped {
            reason: "catalog unreachable".into(),
        });
        assert_eq!(env.severity, EventSeverity::Warning);

        let env = FleetEventEnvelope::new(FleetEvent::ControllerRemoved {
            name: ControllerName::new("controller_5"),
        });
        assert_eq!(env.severity, EventSeverity::Info);
    }

    #[test]
    fn test_event_is_tagged() {
        let json = serde_json::to_value(FleetEvent::ControllerRemoved {
            name: ControllerName::new("controller_5"),
        })
        .unwrap();
        assert_eq!(json["type"], "controller_removed");
        assert_eq!(json["name"], "controller_5");
    }
}
