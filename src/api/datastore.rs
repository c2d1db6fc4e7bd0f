//! Datastore API endpoints.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::{reply, success, ApiResult};
use crate::models::{Datastore, ImportSummary, RevisionInfo};
use crate::AppState;

/// Default and maximum long-poll wait.
const DEFAULT_WAIT_MS: u64 = 25_000;
const MAX_WAIT_MS: u64 = 60_000;

/// Long-poll parameters.
#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    /// Last revision the client has seen.
    #[serde(default)]
    pub since: i64,
    /// How long to wait for a change, in milliseconds.
    #[serde(default = "default_wait")]
    pub timeout_ms: u64,
}

fn default_wait() -> u64 {
    DEFAULT_WAIT_MS
}

impl ChangesQuery {
    /// Requested wait, capped.
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.min(MAX_WAIT_MS))
    }
}

/// GET /api/datastore - Get the full datastore.
pub async fn get_datastore(State(state): State<AppState>) -> ApiResult<Datastore> {
    let datastore =
        state
            .repo
            .get_datastore()
            .await
            .map_err(|e| crate::errors::AppErrorWithRevision {
                error: e,
                revision_id: 0,
            })?;

    let revision_id = datastore.revision_id;
    success(datastore, revision_id)
}

/// GET /api/datastore/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info =
        state
            .repo
            .get_revision_info()
            .await
            .map_err(|e| crate::errors::AppErrorWithRevision {
                error: e,
                revision_id: 0,
            })?;

    let revision_id = revision_info.revision_id;
    success(revision_info, revision_id)
}

/// GET /api/datastore/changes - Wait until the revision moves past `since`.
///
/// Answers as soon as a write lands, or with the unchanged revision once the
/// timeout passes.
pub async fn wait_for_changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<RevisionInfo> {
    let result = match state.repo.wait_for_change(query.since, query.wait()).await {
        Ok(_) => state.repo.get_revision_info().await,
        Err(e) => Err(e),
    };
    reply(&state, result).await
}

/// POST /api/datastore/import - Add the apps and versions of an export.
pub async fn import_datastore(
    State(state): State<AppState>,
    Json(data): Json<Datastore>,
) -> ApiResult<ImportSummary> {
    let result = state.repo.import_datastore(&data).await;
    reply(&state, result).await
}
