//! Startup recovery
//!
//! The saved state is only a cache. At startup the manager first makes sure
//! every saved controller has a running container, then asks every running
//! controller which rooms it serves and trusts that answer over the file.

use super::reconciler::Reconciler;
use crate::controller_api::ControllerEndpoint;
use cu_types::{ControllerName, FleetEvent, RoomId};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

/// What startup recovery did
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Stopped containers started again
    pub started: usize,
    /// Missing containers created anew
    pub recreated: usize,
    /// Running controllers whose rooms were read back
    pub adopted: usize,
    /// Running controllers that did not answer
    pub unreachable: usize,
}

impl Reconciler {
    /// Rebuild the state from the saved file and from live controllers
    #[instrument(name = "checker", skip(self))]
    pub async fn recover(&mut self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        self.verify_saved(&mut report).await;
        self.adopt_running(&mut report).await;

        self.persist().await;
        self.publish_snapshot();
        info!(?report, controllers = self.state.len(), "Startup recovery finished");
        report
    }

    /// Start stopped controllers and recreate missing ones
    async fn verify_saved(&mut self, report: &mut RecoveryReport) {
        for assignment in self.state.assignments().to_vec() {
            let name = assignment.name;
            if assignment.rooms.is_empty() {
                warn!(controller = %name, "Saved controller has no rooms, dropping it");
                self.state.remove(&name);
                continue;
            }

            match self.runtime.get(name.as_str()).await {
                Ok(Some(info)) if info.status.is_running() => {}
                Ok(Some(info)) => {
                    info!(controller = %name, status = ?info.status, "Starting stopped controller");
                    match self.runtime.start(name.as_str()).await {
                        Ok(()) => report.started += 1,
                        Err(e) => {
                            warn!(controller = %name, error = %e, "Could not start controller");
                            self.recreate(&name, &assignment.rooms, report).await;
                        }
                    }
                }
                Ok(None) => {
                    info!(controller = %name, "Saved controller is missing");
                    self.recreate(&name, &assignment.rooms, report).await;
                }
                Err(e) => {
                    warn!(controller = %name, error = %e, "Could not inspect controller");
                }
            }
        }
    }

    async fn recreate(&mut self, name: &ControllerName, rooms: &[RoomId], report: &mut RecoveryReport) {
        match self
            .restart_controller(name, rooms, "container missing at startup")
            .await
        {
            Ok(_) => report.recreated += 1,
            Err(e) => error!(controller = %name, error = %e, "Could not recreate controller"),
        }
    }

    /// Read back the rooms of every running managed controller
    async fn adopt_running(&mut self, report: &mut RecoveryReport) {
        let running = match self.runtime.list().await {
            Ok(running) => running,
            Err(e) => {
                warn!(error = %e, "Could not list running containers");
                return;
            }
        };
        let prefix = self.template.name_prefix().to_string();

        for info in running.into_iter().filter(|c| c.name.starts_with(&prefix)) {
            let name = ControllerName::new(info.name.clone());
            let rooms = match ControllerEndpoint::resolve(&info, self.settings.address_mode) {
                Ok(endpoint) => self.controllers.list_rooms(&endpoint).await,
                Err(e) => Err(e),
            };

            match rooms {
                Ok(rooms) => {
                    info!(controller = %name, ?rooms, "Recovered controller");
                    self.state.set(name.clone(), rooms.clone());
                    if let Some(port) = info.primary_port() {
                        self.register(&name, port).await;
                    }
                    report.adopted += 1;
                    self.emit(FleetEvent::ControllerRecovered { name, rooms });
                }
                Err(e) => {
                    report.unreachable += 1;
                    warn!(controller = %name, error = %e, "Controller did not report its rooms");
                }
            }
        }
    }
}
