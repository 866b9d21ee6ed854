//! Fakes shared by the reconciler integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use cu_manager::backoff::Backoff;
use cu_manager::catalog::RoomSource;
use cu_manager::config::ManagerConfig;
use cu_manager::controller_api::{ControllerApi, ControllerEndpoint};
use cu_manager::error::{CatalogError, CatalogResult, ControllerApiError, ControllerApiResult};
use cu_manager::ports::{PortAllocator, PortProbe};
use cu_manager::registrar::ServiceRegistry;
use cu_manager::runtime::InMemoryRuntime;
use cu_manager::scheduler::{Collaborators, ControllerTemplate, Reconciler, ReconcilerSettings};
use cu_manager::state::{InMemoryStateBackend, StateBackend, StateStore};
use cu_types::{ControllerAssignment, ControllerName, RoomId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ids(raw: &[i64]) -> Vec<RoomId> {
    raw.iter().copied().map(RoomId::new).collect()
}

pub fn assignment(name: &str, rooms: &[i64]) -> ControllerAssignment {
    ControllerAssignment::new(ControllerName::new(name), ids(rooms))
}

/// Catalog whose answer the test controls
#[derive(Default)]
pub struct FakeCatalog {
    rooms: Mutex<Option<Vec<RoomId>>>,
}

impl FakeCatalog {
    pub fn set(&self, rooms: &[i64]) {
        *self.rooms.lock().unwrap() = Some(ids(rooms));
    }

    /// Make the catalog unreachable until the next `set`
    pub fn go_down(&self) {
        *self.rooms.lock().unwrap() = None;
    }
}

#[async_trait]
impl RoomSource for FakeCatalog {
    async fn desired_rooms(&self) -> CatalogResult<Vec<RoomId>> {
        self.rooms
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CatalogError::Unsuccessful("catalog is down".to_string()))
    }
}

/// How a faulty controller misbehaves on add and remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Reject,
    RejectRemove,
    Garble,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    List(String),
    Add(String, Vec<RoomId>),
    Remove(String, Vec<RoomId>),
}

/// Controller API backed by the in-memory runtime.
///
/// A controller serves the rooms it was booted with (its `ROOM_IDS`) until
/// an add or remove changes them.
pub struct FakeControllers {
    runtime: InMemoryRuntime,
    served: Mutex<HashMap<String, Vec<RoomId>>>,
    faults: Mutex<HashMap<String, Fault>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl FakeControllers {
    pub fn new(runtime: InMemoryRuntime) -> Self {
        Self {
            runtime,
            served: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pretend `name` serves `rooms`
    pub fn serve(&self, name: &str, rooms: &[i64]) {
        self.served
            .lock()
            .unwrap()
            .insert(name.to_string(), ids(rooms));
    }

    /// Make add and remove calls to `name` fail
    pub fn fail(&self, name: &str) {
        self.inject(name, Fault::Reject);
    }

    /// Let adds to `name` through but reject removes
    pub fn fail_remove(&self, name: &str) {
        self.inject(name, Fault::RejectRemove);
    }

    /// Answer add and remove calls to `name` with an unreadable body
    pub fn garble(&self, name: &str) {
        self.inject(name, Fault::Garble);
    }

    fn inject(&self, name: &str, fault: Fault) {
        self.faults.lock().unwrap().insert(name.to_string(), fault);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn current(&self, name: &str) -> ControllerApiResult<Vec<RoomId>> {
        let known = self.served.lock().unwrap().get(name).cloned();
        if let Some(rooms) = known {
            return Ok(rooms);
        }
        let env = self
            .runtime
            .env_of(name)
            .await
            .ok_or_else(|| ControllerApiError::Status {
                url: format!("http://{}/rooms", name),
                status: 404,
            })?;
        let raw = env.get("ROOM_IDS").cloned().unwrap_or_default();
        Ok(raw
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<RoomId>().unwrap())
            .collect())
    }

    fn check_failing(&self, name: &str, removing: bool) -> ControllerApiResult<()> {
        let fault = self.faults.lock().unwrap().get(name).copied();
        match fault {
            Some(Fault::Reject) => Err(ControllerApiError::Rejected("injected failure".to_string())),
            Some(Fault::RejectRemove) if removing => {
                Err(ControllerApiError::Rejected("injected failure".to_string()))
            }
            Some(Fault::Garble) => Err(ControllerApiError::Decode(
                "expected value at line 1 column 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ControllerApi for FakeControllers {
    async fn list_rooms(&self, endpoint: &ControllerEndpoint) -> ControllerApiResult<Vec<RoomId>> {
        let name = endpoint.name.to_string();
        self.calls.lock().unwrap().push(ApiCall::List(name.clone()));
        self.current(&name).await
    }

    async fn add_rooms(
        &self,
        endpoint: &ControllerEndpoint,
        rooms: &[RoomId],
    ) -> ControllerApiResult<()> {
        let name = endpoint.name.to_string();
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::Add(name.clone(), rooms.to_vec()));
        self.check_failing(&name, false)?;

        let mut served = self.current(&name).await?;
        for room in rooms {
            if !served.contains(room) {
                served.push(*room);
            }
        }
        self.served.lock().unwrap().insert(name, served);
        Ok(())
    }

    async fn remove_rooms(
        &self,
        endpoint: &ControllerEndpoint,
        rooms: &[RoomId],
    ) -> ControllerApiResult<()> {
        let name = endpoint.name.to_string();
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::Remove(name.clone(), rooms.to_vec()));
        self.check_failing(&name, true)?;

        let mut served = self.current(&name).await?;
        served.retain(|r| !rooms.contains(r));
        self.served.lock().unwrap().insert(name, served);
        Ok(())
    }
}

/// Service registry that remembers what is registered
#[derive(Default)]
pub struct FakeRegistry {
    entries: Mutex<BTreeMap<String, u16>>,
}

impl FakeRegistry {
    pub fn entries(&self) -> BTreeMap<String, u16> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceRegistry for FakeRegistry {
    async fn register(&self, name: &ControllerName, port: u16) -> CatalogResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(name.to_string(), port);
        Ok(())
    }

    async fn deregister(&self, name: &ControllerName) -> CatalogResult<()> {
        self.entries.lock().unwrap().remove(name.as_str());
        Ok(())
    }
}

/// Every port is bindable
pub fn always_free() -> Arc<dyn PortProbe> {
    Arc::new(|_port: u16| true)
}

/// A whole fake environment for one reconciler
pub struct Fleet {
    pub catalog: Arc<FakeCatalog>,
    pub runtime: InMemoryRuntime,
    pub controllers: Arc<FakeControllers>,
    pub registry: Arc<FakeRegistry>,
    pub backend: Arc<dyn StateBackend>,
    pub config: ManagerConfig,
}

impl Fleet {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryStateBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn StateBackend>) -> Self {
        let runtime = InMemoryRuntime::new();
        Self {
            catalog: Arc::new(FakeCatalog::default()),
            controllers: Arc::new(FakeControllers::new(runtime.clone())),
            runtime,
            registry: Arc::new(FakeRegistry::default()),
            backend,
            config: ManagerConfig::default(),
        }
    }

    /// A reconciler over this fleet, with state loaded from the backend
    pub async fn reconciler(&self) -> Reconciler {
        let state = StateStore::load(self.backend.clone()).await;
        Reconciler::new(
            ReconcilerSettings::from_config(&self.config),
            Backoff::new(Duration::from_millis(10), Duration::from_millis(50), 2.0),
            ControllerTemplate::from_config(&self.config),
            state,
            Collaborators {
                catalog: self.catalog.clone(),
                runtime: Arc::new(self.runtime.clone()),
                controllers: self.controllers.clone(),
                registry: self.registry.clone(),
            },
            PortAllocator::with_probe(
                self.config.controllers.base_port,
                self.config.controllers.port_search_limit,
                always_free(),
            ),
        )
    }

    /// `CU_PORT` a controller container was started with
    pub async fn port_of(&self, name: &str) -> Option<u16> {
        self.runtime
            .env_of(name)
            .await
            .and_then(|env| env.get("CU_PORT").and_then(|p| p.parse().ok()))
    }
}
