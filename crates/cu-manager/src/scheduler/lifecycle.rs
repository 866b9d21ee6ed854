//! Controller lifecycle: create, update, restart, remove

use super::reconciler::{Reconciler, UpdateOutcome};
use crate::controller_api::ControllerEndpoint;
use crate::error::{ManagerResult, RuntimeError};
use cu_types::{ControllerName, FleetEvent, RoomId};
use tracing::{debug, error, info, instrument, warn};

impl Reconciler {
    /// Start a controller for `rooms`, record it, and register it
    #[instrument(name = "creator", skip(self))]
    pub async fn create_controller(&mut self, rooms: &[RoomId]) -> ManagerResult<ControllerName> {
        let (name, port) = self.spawn(rooms, None).await?;

        self.state.set(name.clone(), rooms.to_vec());
        self.register(&name, port).await;
        self.persist().await;

        self.emit(FleetEvent::ControllerCreated {
            name: name.clone(),
            rooms: rooms.to_vec(),
            port,
        });
        Ok(name)
    }

    /// Bring `name` to `target`, through its API if possible, by restart otherwise
    #[instrument(name = "modifier", skip(self, target), fields(controller = %name))]
    pub async fn update_controller(
        &mut self,
        name: &ControllerName,
        target: &[RoomId],
    ) -> ManagerResult<UpdateOutcome> {
        let current = match self.state.get(name) {
            Some(a) if a.serves_exactly(target) => return Ok(UpdateOutcome::Unchanged),
            Some(a) => a.rooms.clone(),
            None => Vec::new(),
        };

        let added: Vec<RoomId> = target
            .iter()
            .filter(|r| !current.contains(r))
            .copied()
            .collect();
        let removed: Vec<RoomId> = current
            .iter()
            .filter(|r| !target.contains(r))
            .copied()
            .collect();

        match self.push_changes(name, &added, &removed).await {
            Ok(()) => {
                info!(?added, ?removed, "Controller reconfigured");
                self.state.set(name.clone(), target.to_vec());
                self.persist().await;
                self.emit(FleetEvent::ControllerUpdated {
                    name: name.clone(),
                    added,
                    removed,
                });
                Ok(UpdateOutcome::Updated)
            }
            Err(e) => {
                warn!(error = %e, "Update failed, restarting controller");
                self.resync(name).await;
                let reason = format!("update failed: {}", e);
                let new_name = self.restart_controller(name, target, &reason).await?;
                Ok(UpdateOutcome::Restarted(new_name))
            }
        }
    }

    /// Replace `name` with a fresh container serving `rooms`.
    ///
    /// The new controller takes the old one's position in the state. If the
    /// old container is gone but the new one cannot be started, the entry is
    /// dropped so the next pass creates a controller for those rooms.
    #[instrument(name = "restarter", skip(self, rooms), fields(controller = %name))]
    pub async fn restart_controller(
        &mut self,
        name: &ControllerName,
        rooms: &[RoomId],
        reason: &str,
    ) -> ManagerResult<ControllerName> {
        info!(reason, "Restarting controller");
        self.teardown(name).await?;

        match self.spawn(rooms, Some(name)).await {
            Ok((new_name, port)) => {
                self.state.replace(name, new_name.clone(), rooms.to_vec());
                if &new_name != name {
                    self.deregister(name).await;
                }
                self.register(&new_name, port).await;
                self.persist().await;
                self.emit(FleetEvent::ControllerRestarted {
                    name: new_name.clone(),
                    rooms: rooms.to_vec(),
                    reason: reason.to_string(),
                });
                Ok(new_name)
            }
            Err(e) => {
                self.state.remove(name);
                self.persist().await;
                self.deregister(name).await;
                Err(e)
            }
        }
    }

    /// Stop and remove the container, then forget and deregister it.
    ///
    /// A container that is already gone does not stop the cleanup.
    #[instrument(name = "remover", skip(self), fields(controller = %name))]
    pub async fn remove_controller(&mut self, name: &ControllerName) -> ManagerResult<()> {
        info!("Removing controller");
        self.teardown(name).await?;

        self.state.remove(name);
        self.persist().await;
        self.deregister(name).await;

        self.emit(FleetEvent::ControllerRemoved { name: name.clone() });
        Ok(())
    }

    /// Remove every managed controller. Safe to call more than once.
    #[instrument(skip(self))]
    pub async fn cleanup(&mut self) -> usize {
        let names = self.state.names();
        if names.is_empty() {
            return 0;
        }
        info!(controllers = names.len(), "Removing all controllers");

        let mut removed = 0;
        for name in names {
            match self.remove_controller(&name).await {
                Ok(()) => removed += 1,
                Err(e) => error!(controller = %name, error = %e, "Cleanup failed"),
            }
        }
        self.publish_snapshot();
        removed
    }

    /// Pick a name and a port, then run the container
    async fn spawn(
        &self,
        rooms: &[RoomId],
        replacing: Option<&ControllerName>,
    ) -> ManagerResult<(ControllerName, u16)> {
        let name = self.free_name(rooms, replacing).await?;
        let port = self.ports.allocate(self.runtime.as_ref()).await?;
        let spec = self.template.spec(&name, rooms, port);

        info!(controller = %name, port, ?rooms, "Starting controller container");
        if let Err(e) = self.runtime.run(&spec).await {
            if !matches!(e, RuntimeError::Conflict(_)) {
                self.discard(&name).await;
            }
            return Err(e.into());
        }
        Ok((name, port))
    }

    /// The deterministic name for `rooms`, unless another live controller
    /// holds it, in which case a `-N` suffix is added. A leftover container
    /// with the name that no controller owns is removed.
    async fn free_name(
        &self,
        rooms: &[RoomId],
        replacing: Option<&ControllerName>,
    ) -> ManagerResult<ControllerName> {
        let base = self.template.name_for(rooms);
        let mut candidate = base.clone();
        let mut suffix = 1;

        loop {
            let owned_by_other =
                self.state.contains(&candidate) && Some(&candidate) != replacing;
            if !owned_by_other {
                if self.runtime.get(candidate.as_str()).await?.is_some() {
                    warn!(controller = %candidate, "Removing leftover container");
                    self.teardown(&candidate).await?;
                }
                return Ok(candidate);
            }
            suffix += 1;
            candidate = ControllerName::new(format!("{}-{}", base, suffix));
        }
    }

    /// Push room changes through the controller's API, adds first
    async fn push_changes(
        &self,
        name: &ControllerName,
        added: &[RoomId],
        removed: &[RoomId],
    ) -> ManagerResult<()> {
        let endpoint = self.endpoint_of(name).await?;
        if !added.is_empty() {
            self.controllers.add_rooms(&endpoint, added).await?;
        }
        if !removed.is_empty() {
            self.controllers.remove_rooms(&endpoint, removed).await?;
        }
        Ok(())
    }

    /// Re-read what the controller actually serves after a failed update
    async fn resync(&mut self, name: &ControllerName) {
        let endpoint = match self.endpoint_of(name).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                debug!(error = %e, "Controller unreachable for resync");
                return;
            }
        };
        match self.controllers.list_rooms(&endpoint).await {
            Ok(rooms) => {
                debug!(?rooms, "Resynchronised with controller");
                self.state.set(name.clone(), rooms);
            }
            Err(e) => debug!(error = %e, "Controller did not answer resync query"),
        }
    }

    pub(super) async fn endpoint_of(&self, name: &ControllerName) -> ManagerResult<ControllerEndpoint> {
        let info = self
            .runtime
            .get(name.as_str())
            .await?
            .filter(|c| c.status.is_running())
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        Ok(ControllerEndpoint::resolve(&info, self.settings.address_mode)?)
    }

    /// Stop and remove a container, tolerating one that no longer exists
    pub(super) async fn teardown(&self, name: &ControllerName) -> ManagerResult<()> {
        match self.runtime.stop(name.as_str()).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        match self.runtime.remove(name.as_str()).await {
            Ok(()) => Ok(()),
            Err(RuntimeError::NotFound(_)) => {
                debug!(controller = %name, "Container already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of a half-created container
    async fn discard(&self, name: &ControllerName) {
        match self.runtime.get(name.as_str()).await {
            Ok(Some(_)) => {
                if let Err(e) = self.teardown(name).await {
                    warn!(controller = %name, error = %e, "Could not discard failed container");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(controller = %name, error = %e, "Could not inspect failed container"),
        }
    }

    pub(super) async fn register(&self, name: &ControllerName, port: u16) {
        if let Err(e) = self.registry.register(name, port).await {
            warn!(controller = %name, error = %e, "Service registration failed");
        }
    }

    pub(super) async fn deregister(&self, name: &ControllerName) {
        if let Err(e) = self.registry.deregister(name).await {
            warn!(controller = %name, error = %e, "Service deregistration failed");
        }
    }
}
