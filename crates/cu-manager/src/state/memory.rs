//! In-memory state backend

use super::traits::StateBackend;
use crate::error::StateResult;
use async_trait::async_trait;
use cu_types::ControllerAssignment;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps the last saved state in memory and counts saves
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateBackend {
    saved: Arc<RwLock<Option<Vec<ControllerAssignment>>>>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously saved assignments
    pub fn with_state(assignments: Vec<ControllerAssignment>) -> Self {
        Self {
            saved: Arc::new(RwLock::new(Some(assignments))),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn snapshot(&self) -> Option<Vec<ControllerAssignment>> {
        self.saved.read().await.clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateBackend for InMemoryStateBackend {
    async fn load(&self) -> StateResult<Option<Vec<ControllerAssignment>>> {
        Ok(self.saved.read().await.clone())
    }

    async fn save(&self, assignments: &[ControllerAssignment]) -> StateResult<()> {
        *self.saved.write().await = Some(assignments.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
