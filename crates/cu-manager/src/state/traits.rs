//! State backend trait definitions

use crate::error::StateResult;
use async_trait::async_trait;
use cu_types::ControllerAssignment;

/// Where the assignment state is persisted
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Load the saved assignments, `None` if nothing was ever saved
    async fn load(&self) -> StateResult<Option<Vec<ControllerAssignment>>>;

    /// Replace the saved assignments wholesale
    async fn save(&self, assignments: &[ControllerAssignment]) -> StateResult<()>;
}
