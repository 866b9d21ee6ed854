//! Recent fleet events, kept for the status API

use cu_types::FleetEventEnvelope;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;

/// Default number of events kept
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 500;

/// Bounded buffer of the latest events, oldest dropped first
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Arc<RwLock<VecDeque<FleetEventEnvelope>>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub async fn push(&self, event: FleetEventEnvelope) {
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Up to `limit` events, newest first
    pub async fn recent(&self, limit: usize) -> Vec<FleetEventEnvelope> {
        self.events
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Copy everything sent on `rx` into the log until the channel closes
    pub fn spawn_collector(&self, mut rx: broadcast::Receiver<FleetEventEnvelope>) -> JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log.push(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event log fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cu_types::{ControllerName, FleetEvent};

    fn removed(name: &str) -> FleetEventEnvelope {
        FleetEventEnvelope::new(FleetEvent::ControllerRemoved {
            name: ControllerName::new(name),
        })
    }

    #[tokio::test]
    async fn test_oldest_events_dropped() {
        let log = EventLog::new(2);
        log.push(removed("a")).await;
        log.push(removed("b")).await;
        log.push(removed("c")).await;

        assert_eq!(log.len().await, 2);
        let recent = log.recent(10).await;
        assert_eq!(
            recent.iter().map(|e| e.event.clone()).collect::<Vec<_>>(),
            vec![removed("c").event, removed("b").event]
        );
        assert_eq!(log.recent(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_collector_follows_channel() {
        let (tx, rx) = broadcast::channel(8);
        let log = EventLog::new(10);
        let handle = log.spawn_collector(rx);

        tx.send(removed("controller_5")).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(log.len().await, 1);
    }
}
