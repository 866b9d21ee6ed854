//! The reconciler's assignment state

use super::traits::StateBackend;
use crate::error::StateResult;
use cu_types::{ControllerAssignment, ControllerName, RoomId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Ordered `controller -> rooms` map plus the backend it is saved to.
///
/// Controller order matters: the reconciler pairs the n-th controller with
/// the n-th batch of rooms.
pub struct StateStore {
    assignments: Vec<ControllerAssignment>,
    backend: Arc<dyn StateBackend>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("assignments", &self.assignments)
            .finish()
    }
}

impl StateStore {
    /// Empty store that saves to `backend`
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            assignments: Vec::new(),
            backend,
        }
    }

    /// Load from `backend`. A missing or unreadable state starts fresh:
    /// startup recovery rebuilds the assignments from live controllers.
    pub async fn load(backend: Arc<dyn StateBackend>) -> Self {
        let assignments = match backend.load().await {
            Ok(Some(assignments)) => {
                info!(controllers = assignments.len(), "Loaded state");
                assignments
            }
            Ok(None) => {
                info!("No saved state found, starting fresh");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Saved state unreadable, starting fresh");
                Vec::new()
            }
        };
        Self {
            assignments,
            backend,
        }
    }

    /// Write the current assignments through the backend
    pub async fn persist(&self) -> StateResult<()> {
        self.backend.save(&self.assignments).await
    }

    pub fn assignments(&self) -> &[ControllerAssignment] {
        &self.assignments
    }

    pub fn names(&self) -> Vec<ControllerName> {
        self.assignments.iter().map(|a| a.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn contains(&self, name: &ControllerName) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &ControllerName) -> Option<&ControllerAssignment> {
        self.assignments.iter().find(|a| &a.name == name)
    }

    pub fn rooms_of(&self, name: &ControllerName) -> Option<&[RoomId]> {
        self.get(name).map(|a| a.rooms.as_slice())
    }

    /// Union of every controller's rooms
    pub fn all_rooms(&self) -> BTreeSet<RoomId> {
        self.assignments
            .iter()
            .flat_map(|a| a.rooms.iter().copied())
            .collect()
    }

    /// Whether some room is assigned to more than one controller
    pub fn has_overlaps(&self) -> bool {
        let assigned: usize = self.assignments.iter().map(|a| a.rooms.len()).sum();
        assigned != self.all_rooms().len()
    }

    /// Set the rooms of `name`, keeping its position, or append it
    pub fn set(&mut self, name: ControllerName, rooms: Vec<RoomId>) {
        match self.position(&name) {
            Some(idx) => self.assignments[idx].rooms = rooms,
            None => self.assignments.push(ControllerAssignment::new(name, rooms)),
        }
    }

    /// Replace `old` by `new` at the same position, or append `new`
    pub fn replace(&mut self, old: &ControllerName, new: ControllerName, rooms: Vec<RoomId>) {
        match self.position(old) {
            Some(idx) => {
                self.assignments[idx] = ControllerAssignment::new(new.clone(), rooms);
                // `new` may already exist further down after an earlier partial failure
                let mut seen = false;
                self.assignments.retain(|a| {
                    if a.name != new {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.set(new, rooms),
        }
    }

    pub fn remove(&mut self, name: &ControllerName) -> Option<Vec<RoomId>> {
        self.position(name)
            .map(|idx| self.assignments.remove(idx).rooms)
    }

    fn position(&self, name: &ControllerName) -> Option<usize> {
        self.assignments.iter().position(|a| &a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStateBackend;

    fn rooms(raw: &[i64]) -> Vec<RoomId> {
        raw.iter().copied().map(RoomId::new).collect()
    }

    fn name(n: &str) -> ControllerName {
        ControllerName::new(n)
    }

    #[tokio::test]
    async fn test_load_and_persist_round_trip() {
        let backend = InMemoryStateBackend::new();
        let mut store = StateStore::load(Arc::new(backend.clone())).await;
        assert!(store.is_empty());

        store.set(name("controller_1_2"), rooms(&[1, 2]));
        store.set(name("controller_3"), rooms(&[3]));
        store.persist().await.unwrap();

        let reloaded = StateStore::load(Arc::new(backend.clone())).await;
        assert_eq!(reloaded.assignments(), store.assignments());
        assert_eq!(backend.save_count(), 1);
    }

    #[tokio::test]
    async fn test_set_keeps_position() {
        let mut store = StateStore::new(Arc::new(InMemoryStateBackend::new()));
        store.set(name("a"), rooms(&[1]));
        store.set(name("b"), rooms(&[2]));
        store.set(name("a"), rooms(&[1, 3]));

        assert_eq!(store.names(), vec![name("a"), name("b")]);
        assert_eq!(store.rooms_of(&name("a")), Some(&rooms(&[1, 3])[..]));
        assert_eq!(store.all_rooms().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_in_place() {
        let mut store = StateStore::new(Arc::new(InMemoryStateBackend::new()));
        store.set(name("controller_1_2"), rooms(&[1, 2]));
        store.set(name("controller_3_4"), rooms(&[3, 4]));

        store.replace(&name("controller_1_2"), name("controller_1_5"), rooms(&[1, 5]));
        assert_eq!(
            store.names(),
            vec![name("controller_1_5"), name("controller_3_4")]
        );

        store.replace(&name("ghost"), name("controller_9"), rooms(&[9]));
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_replace_drops_duplicate_entry() {
        let mut store = StateStore::new(Arc::new(InMemoryStateBackend::new()));
        store.set(name("controller_1_2"), rooms(&[1, 2]));
        store.set(name("controller_3"), rooms(&[3]));

        store.replace(&name("controller_1_2"), name("controller_3"), rooms(&[3]));
        assert_eq!(store.names(), vec![name("controller_3")]);
    }

    #[tokio::test]
    async fn test_overlap_detection() {
        let mut store = StateStore::new(Arc::new(InMemoryStateBackend::new()));
        store.set(name("controller_1_2"), rooms(&[1, 2]));
        store.set(name("controller_3"), rooms(&[3]));
        assert!(!store.has_overlaps());

        store.set(name("controller_2_4"), rooms(&[2, 4]));
        assert!(store.has_overlaps());
    }

    #[tokio::test]
    async fn test_remove() {
        let mut store = StateStore::new(Arc::new(InMemoryStateBackend::new()));
        store.set(name("controller_5"), rooms(&[5]));
        assert_eq!(store.remove(&name("controller_5")), Some(rooms(&[5])));
        assert_eq!(store.remove(&name("controller_5")), None);
    }
}
