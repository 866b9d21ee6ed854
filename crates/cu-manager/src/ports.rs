//! Host port allocation for new controllers

use crate::error::PortError;
use crate::runtime::ContainerRuntime;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Answers whether a port can be bound on this host right now
pub trait PortProbe: Send + Sync {
    fn is_free(&self, port: u16) -> bool;
}

/// Probes by binding `0.0.0.0:<port>` and releasing it immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBindProbe;

impl PortProbe for TcpBindProbe {
    fn is_free(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

impl<F> PortProbe for F
where
    F: Fn(u16) -> bool + Send + Sync,
{
    fn is_free(&self, port: u16) -> bool {
        self(port)
    }
}

/// Picks the lowest usable port at or above a base port.
///
/// A port is usable when no running container publishes it and the OS lets
/// us bind it. Nothing is reserved: the caller must use the port before the
/// next allocation, which the single reconcile loop guarantees.
#[derive(Clone)]
pub struct PortAllocator {
    base: u16,
    limit: u16,
    probe: Arc<dyn PortProbe>,
}

impl std::fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAllocator")
            .field("base", &self.base)
            .field("limit", &self.limit)
            .finish()
    }
}

impl PortAllocator {
    /// Scan `limit` ports starting at `base`
    pub fn new(base: u16, limit: u16) -> Self {
        Self::with_probe(base, limit, Arc::new(TcpBindProbe))
    }

    pub fn with_probe(base: u16, limit: u16, probe: Arc<dyn PortProbe>) -> Self {
        Self { base, limit, probe }
    }

    /// Last port the scan will consider
    pub fn last_port(&self) -> u16 {
        self.base
            .saturating_add(self.limit.saturating_sub(1))
    }

    /// Lowest port in range that is neither in `taken` nor bound on the host
    pub fn allocate_excluding(&self, taken: &HashSet<u16>) -> Result<u16, PortError> {
        for port in self.base..=self.last_port() {
            if taken.contains(&port) {
                debug!(port, "Port published by a container, checking next");
                continue;
            }
            if !self.probe.is_free(port) {
                debug!(port, "Port is bound on the host, checking next");
                continue;
            }
            info!(port, "Next available port found");
            return Ok(port);
        }
        Err(PortError::Exhausted {
            base: self.base,
            last: self.last_port(),
        })
    }

    /// Allocate a port, consulting the runtime for ports already published.
    ///
    /// If the runtime cannot be listed the OS check alone decides.
    pub async fn allocate(&self, runtime: &dyn ContainerRuntime) -> Result<u16, PortError> {
        let taken: HashSet<u16> = match runtime.bound_ports().await {
            Ok(ports) => ports.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Could not list container ports");
                HashSet::new()
            }
        };
        debug!(?taken, "Ports published by running containers");
        self.allocate_excluding(&taken)
    }
}
