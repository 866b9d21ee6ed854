//! In-memory container runtime

use super::traits::{ContainerInfo, ContainerRuntime, ContainerSpec, ContainerStatus};
use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A runtime operation, as recorded by [`InMemoryRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
}

#[derive(Debug, Default)]
struct Inner {
    containers: BTreeMap<String, ContainerInfo>,
    env: BTreeMap<String, BTreeMap<String, String>>,
    calls: Vec<RuntimeCall>,
    failing_creates: HashSet<String>,
    failing_stops: HashSet<String>,
    next_host: u32,
}

/// In-memory runtime for development and testing.
///
/// Containers get a fake network address and keep the host ports they were
/// created with. Every mutating call is recorded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuntime {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an already-running container, e.g. one left over from a previous run
    pub async fn insert(&self, info: ContainerInfo) {
        self.inner
            .write()
            .await
            .containers
            .insert(info.name.clone(), info);
    }

    /// Make the next `create` of `name` fail
    pub async fn fail_create(&self, name: &str) {
        self.inner
            .write()
            .await
            .failing_creates
            .insert(name.to_string());
    }

    /// Make the next `stop` of `name` fail
    pub async fn fail_stop(&self, name: &str) {
        self.inner
            .write()
            .await
            .failing_stops
            .insert(name.to_string());
    }

    /// Simulate a container dying without the manager noticing
    pub async fn kill(&self, name: &str) {
        if let Some(c) = self.inner.write().await.containers.get_mut(name) {
            c.status = ContainerStatus::Exited;
        }
    }

    /// Simulate a container vanishing
    pub async fn forget(&self, name: &str) {
        self.inner.write().await.containers.remove(name);
    }

    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.inner.read().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.inner.write().await.calls.clear();
    }

    /// Environment a container was created with
    pub async fn env_of(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.inner.read().await.env.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.containers.keys().cloned().collect()
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn list(&self) -> RuntimeResult<Vec<ContainerInfo>> {
        let inner = self.inner.read().await;
        Ok(inner
            .containers
            .values()
            .filter(|c| c.status.is_running())
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> RuntimeResult<Option<ContainerInfo>> {
        Ok(self.inner.read().await.containers.get(name).cloned())
    }

    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<()> {
        let mut inner = self.inner.write().await;
        inner.calls.push(RuntimeCall::Create(spec.name.clone()));

        if inner.failing_creates.remove(&spec.name) {
            return Err(RuntimeError::CommandFailed {
                command: "create".to_string(),
                stderr: format!("injected failure for {}", spec.name),
            });
        }
        if inner.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Conflict(spec.name.clone()));
        }

        inner.next_host += 1;
        let ip = format!("10.0.{}.{}", inner.next_host / 250, inner.next_host % 250 + 2);
        inner.containers.insert(
            spec.name.clone(),
            ContainerInfo {
                name: spec.name.clone(),
                status: ContainerStatus::Created,
                host_ports: spec.ports.iter().map(|p| p.host_port).collect(),
                ip_address: Some(ip),
            },
        );
        inner.env.insert(spec.name.clone(), spec.env.clone());
        Ok(())
    }

    async fn start(&self, name: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.write().await;
        inner.calls.push(RuntimeCall::Start(name.to_string()));
        let container = inner
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.write().await;
        inner.calls.push(RuntimeCall::Stop(name.to_string()));
        if inner.failing_stops.remove(name) {
            return Err(RuntimeError::CommandFailed {
                command: "stop".to_string(),
                stderr: format!("injected failure for {}", name),
            });
        }
        let container = inner
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.write().await;
        inner.calls.push(RuntimeCall::Remove(name.to_string()));
        inner
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        inner.env.remove(name);
        Ok(())
    }
}
