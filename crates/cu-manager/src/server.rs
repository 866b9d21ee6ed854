//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::backoff::Backoff;
use crate::catalog::CatalogClient;
use crate::config::ManagerConfig;
use crate::controller_api::HttpControllerApi;
use crate::error::{ManagerError, ManagerResult};
use crate::events::EventLog;
use crate::ports::PortAllocator;
use crate::registrar::{load_template, CatalogRegistrar};
use crate::runtime::DockerCli;
use crate::scheduler::{Collaborators, ControllerTemplate, Reconciler, ReconcilerSettings};
use crate::state::{FileStateBackend, StateStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Control-unit manager server
pub struct Server {
    config: ManagerConfig,
    reconciler: Reconciler,
}

impl Server {
    /// Wire the production collaborators: docker CLI, catalog over HTTP and
    /// the JSON state file
    pub async fn new(config: ManagerConfig) -> ManagerResult<Self> {
        let runtime = DockerCli::new(
            config.controllers.runtime_timeout(),
            config.controllers.stop_timeout_secs,
        );
        let catalog = CatalogClient::new(config.catalog.clone())?;
        let controllers = HttpControllerApi::new(config.controllers.request_timeout())?;
        let template = load_template(config.registration.spec_file.as_deref());
        let registry = CatalogRegistrar::new(&config.catalog, template)?;

        let backend = FileStateBackend::new(&config.state.path);
        info!(path = %backend.path().display(), "Using state file");
        let state = StateStore::load(Arc::new(backend)).await;

        let reconciler = Reconciler::new(
            ReconcilerSettings::from_config(&config),
            Backoff::from_config(&config.reconciler),
            ControllerTemplate::from_config(&config),
            state,
            Collaborators {
                catalog: Arc::new(catalog),
                runtime: Arc::new(runtime),
                controllers: Arc::new(controllers),
                registry: Arc::new(registry),
            },
            PortAllocator::new(
                config.controllers.base_port,
                config.controllers.port_search_limit,
            ),
        );

        Ok(Self::with_reconciler(config, reconciler))
    }

    /// Run with an already assembled reconciler
    pub fn with_reconciler(config: ManagerConfig, reconciler: Reconciler) -> Self {
        Self { config, reconciler }
    }

    /// Recover, reconcile until a shutdown signal, then remove every
    /// controller. A second signal during cleanup aborts it.
    pub async fn run(self) -> ManagerResult<()> {
        let Self {
            config,
            mut reconciler,
        } = self;

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let events = EventLog::default();
        events.spawn_collector(reconciler.subscribe());

        let api = if config.server.enabled {
            let addr = config.server.listen_addr;
            let state = AppState::new(
                reconciler.snapshots(),
                events.clone(),
                reconciler.event_sender(),
                trigger_tx.clone(),
            );
            let listener = TcpListener::bind(addr).await?;
            info!("Status API listening on {}", addr);

            let mut api_shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, create_router(state))
                    .with_graceful_shutdown(async move {
                        let _ = api_shutdown.wait_for(|stop| *stop).await;
                    })
                    .await
            }))
        } else {
            None
        };

        let mut worker = tokio::spawn(async move {
            reconciler.recover().await;
            reconciler.run(trigger_rx, shutdown_rx).await;
            let removed = reconciler.cleanup().await;
            info!(removed, "Controllers removed");
        });

        tokio::select! {
            _ = shutdown_signal() => {}
            result = &mut worker => {
                return result.map_err(|e| ManagerError::Server(e.to_string()));
            }
        }

        info!("Shutting down, removing controllers (signal again to abort)");
        let _ = shutdown_tx.send(true);

        tokio::select! {
            result = &mut worker => {
                result.map_err(|e| ManagerError::Server(e.to_string()))?;
            }
            _ = shutdown_signal() => {
                warn!("Second signal received, aborting cleanup");
                worker.abort();
            }
        }

        if let Some(api) = api {
            match api.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Status API failed"),
                Err(e) => error!(error = %e, "Status API task failed"),
            }
        }

        info!("Control-unit manager stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
