//! Reconciliation loop

use super::template::ControllerTemplate;
use crate::backoff::Backoff;
use crate::catalog::RoomSource;
use crate::config::{AddressMode, ManagerConfig};
use crate::controller_api::ControllerApi;
use crate::error::ManagerResult;
use crate::partition::{dedup_preserving_order, partition};
use crate::ports::PortAllocator;
use crate::registrar::ServiceRegistry;
use crate::runtime::ContainerRuntime;
use crate::state::StateStore;
use cu_types::{ControllerAssignment, FleetEvent, FleetEventEnvelope, RoomId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

/// Capacity of the fleet event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External systems the reconciler drives
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn RoomSource>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub controllers: Arc<dyn ControllerApi>,
    pub registry: Arc<dyn ServiceRegistry>,
}

/// Tunables of the reconcile loop
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub rooms_per_controller: usize,
    pub address_mode: AddressMode,
    pub interval: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            rooms_per_controller: config.controllers.rooms_per_controller,
            address_mode: config.controllers.address_mode,
            interval: config.reconciler.interval(),
        }
    }
}

/// What one pass did
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub created: usize,
    pub updated: usize,
    pub restarted: usize,
    pub removed: usize,
    pub failed: usize,
}

impl PassReport {
    /// True when the pass touched nothing
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of bringing one controller to its target batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Already serving the batch
    Unchanged,
    /// Reconfigured in place through its API
    Updated,
    /// Replaced by a fresh container with this name
    Restarted(cu_types::ControllerName),
}

/// Converges controller containers onto the catalog's room list.
///
/// The reconciler is the only writer of the [`StateStore`]. Passes never
/// overlap: the loop runs them one after another on a single task.
pub struct Reconciler {
    pub(super) settings: ReconcilerSettings,
    pub(super) template: ControllerTemplate,
    pub(super) state: StateStore,
    pub(super) catalog: Arc<dyn RoomSource>,
    pub(super) runtime: Arc<dyn ContainerRuntime>,
    pub(super) controllers: Arc<dyn ControllerApi>,
    pub(super) registry: Arc<dyn ServiceRegistry>,
    pub(super) ports: PortAllocator,
    backoff: Backoff,
    event_tx: broadcast::Sender<FleetEventEnvelope>,
    snapshot_tx: watch::Sender<Vec<ControllerAssignment>>,
}

impl Reconciler {
    pub fn new(
        settings: ReconcilerSettings,
        backoff: Backoff,
        template: ControllerTemplate,
        state: StateStore,
        collaborators: Collaborators,
        ports: PortAllocator,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, _) = watch::channel(state.assignments().to_vec());

        Self {
            settings,
            template,
            state,
            catalog: collaborators.catalog,
            runtime: collaborators.runtime,
            controllers: collaborators.controllers,
            registry: collaborators.registry,
            ports,
            backoff,
            event_tx,
            snapshot_tx,
        }
    }

    /// Subscribe to fleet events
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Sender side of the event channel, for components that subscribe later
    pub fn event_sender(&self) -> broadcast::Sender<FleetEventEnvelope> {
        self.event_tx.clone()
    }

    /// Receiver of the assignments as of the end of the latest pass
    pub fn snapshots(&self) -> watch::Receiver<Vec<ControllerAssignment>> {
        self.snapshot_tx.subscribe()
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Run one reconcile pass.
    ///
    /// Only an unavailable catalog fails the pass. Failures of individual
    /// controllers are logged, reported, and retried by the next pass.
    #[instrument(name = "reconcile", skip(self))]
    pub async fn reconcile_once(&mut self) -> ManagerResult<PassReport> {
        let desired = match self.catalog.desired_rooms().await {
            Ok(rooms) => dedup_preserving_order(&rooms),
            Err(e) => {
                warn!(error = %e, "Catalog unavailable, skipping this pass");
                self.emit(FleetEvent::ReconcileSkipped {
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let current = self.state.all_rooms();
        let wanted: BTreeSet<RoomId> = desired.iter().copied().collect();
        let to_add: Vec<RoomId> = wanted.difference(&current).copied().collect();
        let to_remove: Vec<RoomId> = current.difference(&wanted).copied().collect();

        if to_add.is_empty() && to_remove.is_empty() && !self.state.has_overlaps() {
            debug!(rooms = wanted.len(), "Controllers already match the catalog");
            return Ok(PassReport::default());
        }
        info!(?to_add, ?to_remove, "Room set changed, rebalancing controllers");

        let batches = partition(&desired, self.settings.rooms_per_controller);
        let existing = self.state.names();
        let mut report = PassReport::default();

        for idx in 0..existing.len().max(batches.len()) {
            match (existing.get(idx), batches.get(idx)) {
                (Some(name), Some(batch)) => match self.update_controller(name, batch).await {
                    Ok(UpdateOutcome::Unchanged) => {}
                    Ok(UpdateOutcome::Updated) => report.updated += 1,
                    Ok(UpdateOutcome::Restarted(_)) => report.restarted += 1,
                    Err(e) => self.record_failure(&mut report, name, "update", &e),
                },
                (Some(name), None) => match self.remove_controller(name).await {
                    Ok(()) => report.removed += 1,
                    Err(e) => self.record_failure(&mut report, name, "remove", &e),
                },
                (None, Some(batch)) => match self.create_controller(batch).await {
                    Ok(_) => report.created += 1,
                    Err(e) => {
                        let name = self.template.name_for(batch);
                        self.record_failure(&mut report, &name, "create", &e);
                    }
                },
                (None, None) => {}
            }
        }

        self.publish_snapshot();
        self.emit(FleetEvent::ReconcileCompleted {
            controllers: self.state.len(),
            rooms: self.state.all_rooms().len(),
        });
        info!(?report, "Reconcile pass finished");
        Ok(report)
    }

    /// Run passes until `shutdown` flips to true or its sender goes away.
    ///
    /// The first pass starts immediately. After a failed pass the next one
    /// waits for the backoff delay instead of the regular interval. A message
    /// on `trigger` starts the next pass early.
    pub async fn run(
        &mut self,
        mut trigger: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval = ?self.settings.interval, "Reconcile loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.reconcile_once().await {
                Ok(_) => {
                    self.backoff.reset();
                    self.settings.interval
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        error = %e,
                        failures = self.backoff.failures(),
                        retry_in = ?delay,
                        "Reconcile pass failed"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
                Some(()) = trigger.recv() => debug!("Reconcile requested"),
            }
        }

        info!("Reconcile loop stopped");
    }

    fn record_failure(
        &self,
        report: &mut PassReport,
        name: &cu_types::ControllerName,
        operation: &str,
        e: &crate::error::ManagerError,
    ) {
        error!(controller = %name, operation, error = %e, "Controller operation failed");
        report.failed += 1;
        self.emit(FleetEvent::OperationFailed {
            name: name.clone(),
            operation: operation.to_string(),
            reason: e.to_string(),
        });
    }

    pub(super) fn emit(&self, event: FleetEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(FleetEventEnvelope::new(event));
    }

    pub(super) fn publish_snapshot(&self) {
        self.snapshot_tx
            .send_replace(self.state.assignments().to_vec());
    }

    /// Save the state, logging rather than failing
    pub(super) async fn persist(&self) {
        if let Err(e) = self.state.persist().await {
            error!(error = %e, "Failed to persist controller state");
        }
    }
}
