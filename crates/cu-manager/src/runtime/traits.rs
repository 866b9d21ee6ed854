//! Container runtime trait definitions

use crate::error::RuntimeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed container lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Other(String),
}

impl ContainerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// What the manager knows about a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub status: ContainerStatus,

    /// Host ports published by the container, in container-port order
    pub host_ports: Vec<u16>,

    /// Address on the attached network, if any
    pub ip_address: Option<String>,
}

impl ContainerInfo {
    /// The first published host port
    pub fn primary_port(&self) -> Option<u16> {
        self.host_ports.first().copied()
    }
}

/// Host port published for a container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

impl PortMapping {
    /// Publish `port` on the same host port
    pub fn same(port: u16) -> Self {
        Self {
            container_port: port,
            host_port: port,
        }
    }
}

/// Everything needed to create a detached container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub network: String,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
}

/// Minimal container runtime surface used by the reconciler
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List running containers
    async fn list(&self) -> RuntimeResult<Vec<ContainerInfo>>;

    /// Inspect a container by name, running or not
    async fn get(&self, name: &str) -> RuntimeResult<Option<ContainerInfo>>;

    /// Create a container without starting it
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<()>;

    async fn start(&self, name: &str) -> RuntimeResult<()>;

    async fn stop(&self, name: &str) -> RuntimeResult<()>;

    async fn remove(&self, name: &str) -> RuntimeResult<()>;

    /// Create and start a container, returning what the runtime reports
    async fn run(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerInfo> {
        self.create(spec).await?;
        self.start(&spec.name).await?;
        self.get(&spec.name)
            .await?
            .ok_or_else(|| crate::error::RuntimeError::NotFound(spec.name.clone()))
    }

    /// Host ports published by every running container
    async fn bound_ports(&self) -> RuntimeResult<Vec<u16>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .flat_map(|c| c.host_ports)
            .collect())
    }
}
