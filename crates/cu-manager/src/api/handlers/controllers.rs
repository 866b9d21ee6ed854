//! Controller and reconcile handlers

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, http::StatusCode, Json};
use cu_types::ControllerAssignment;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

/// Controller listing
#[derive(Debug, Serialize)]
pub struct ControllersResponse {
    pub controllers: Vec<ControllerAssignment>,
    pub total_rooms: usize,
}

/// Controllers and their rooms, in pairing order
pub async fn list_controllers(State(state): State<AppState>) -> Json<ControllersResponse> {
    let controllers = state.snapshots.borrow().clone();
    let total_rooms = controllers.iter().map(|c| c.rooms.len()).sum();
    Json(ControllersResponse {
        controllers,
        total_rooms,
    })
}

/// Reconcile request response
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub status: String,
}

/// Ask the loop for a pass now. Requests arriving while one is already
/// queued are folded into it.
pub async fn trigger_reconcile(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<ReconcileResponse>)> {
    match state.trigger_tx.try_send(()) {
        Ok(()) | Err(TrySendError::Full(())) => Ok((
            StatusCode::ACCEPTED,
            Json(ReconcileResponse {
                status: "scheduled".to_string(),
            }),
        )),
        Err(TrySendError::Closed(())) => Err(ApiError::Unavailable(
            "reconcile loop is not running".to_string(),
        )),
    }
}
