//! Application state for API handlers

use crate::events::EventLog;
use cu_types::{ControllerAssignment, FleetEventEnvelope};
use tokio::sync::{broadcast, mpsc, watch};

/// Shared application state.
///
/// Handlers only read: the controller list comes from the reconciler's
/// snapshots and a reconcile request is a message to the loop.
#[derive(Clone)]
pub struct AppState {
    /// Assignments as of the latest pass
    pub snapshots: watch::Receiver<Vec<ControllerAssignment>>,

    /// Recent events
    pub events: EventLog,

    /// Event broadcast channel
    pub event_tx: broadcast::Sender<FleetEventEnvelope>,

    /// Requests an immediate reconcile pass
    pub trigger_tx: mpsc::Sender<()>,

    /// Manager version
    pub version: String,

    /// Manager start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        snapshots: watch::Receiver<Vec<ControllerAssignment>>,
        events: EventLog,
        event_tx: broadcast::Sender<FleetEventEnvelope>,
        trigger_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            snapshots,
            events,
            event_tx,
            trigger_tx,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
