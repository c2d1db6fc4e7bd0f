//! Generation status and notification endpoints.

use axum::extract::{Path, State};
use serde::Serialize;

use super::{reply, ApiResult};
use crate::errors::AppError;
use crate::lifecycle::GenerationStatus;
use crate::notify::Toast;
use crate::AppState;

/// Pending notifications for the UI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notifications {
    pub toasts: Vec<Toast>,
    /// URLs to open, drained by this read.
    pub open_urls: Vec<String>,
}

/// GET /api/generation - Busy flag and stage of the create workflow.
pub async fn get_generation(State(state): State<AppState>) -> ApiResult<GenerationStatus> {
    let status = state.manager.status();
    reply(&state, Ok(status)).await
}

/// GET /api/notifications - Active toasts and queued URLs.
pub async fn list_notifications(State(state): State<AppState>) -> ApiResult<Notifications> {
    let notifications = Notifications {
        toasts: state.toasts.active(),
        open_urls: state.toasts.take_open_urls(),
    };
    reply(&state, Ok(notifications)).await
}

/// DELETE /api/notifications/:id - Dismiss a toast.
pub async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let result = if state.toasts.dismiss(&id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Notification {} not found", id)))
    };
    reply(&state, result).await
}
