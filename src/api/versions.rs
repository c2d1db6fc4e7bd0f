//! Version history and diff API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{load_app, reply, ApiResult, ChangesQuery, OrderQuery};
use crate::db::{DocQuery, QueryDocs, SortOrder};
use crate::errors::AppError;
use crate::models::{App, Version, VersionRef, VersionSummary};
use crate::versions::{
    self, compute_diff, count_lines, render_side_by_side, render_unified, DiffSelection, Hunk,
    HunkKind, SelectOutcome, SelectionState, SideBySideRow,
};
use crate::AppState;

/// Current diff selection of one app.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    pub state: SelectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SelectOutcome>,
    pub old: Option<VersionSummary>,
    pub new: Option<VersionSummary>,
    pub inverted: bool,
}

impl SelectionView {
    fn of(selection: &DiffSelection, outcome: Option<SelectOutcome>) -> Self {
        Self {
            state: selection.state(),
            outcome,
            old: selection.old().map(VersionSummary::from),
            new: selection.new_version().map(VersionSummary::from),
            inverted: selection.is_inverted(),
        }
    }
}

/// A computed diff in every rendering.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffView {
    pub old: VersionSummary,
    pub new: VersionSummary,
    pub inverted: bool,
    pub added: usize,
    pub removed: usize,
    pub hunks: Vec<Hunk>,
    pub unified: String,
    pub side_by_side: Vec<SideBySideRow>,
}

impl DiffView {
    fn between(old: &Version, new: &Version) -> Self {
        let hunks = compute_diff(&old.code, &new.code);
        Self {
            old: old.into(),
            new: new.into(),
            inverted: old.version > new.version,
            added: count_lines(&hunks, HunkKind::Added),
            removed: count_lines(&hunks, HunkKind::Removed),
            unified: render_unified(&hunks),
            side_by_side: render_side_by_side(&hunks),
            hunks,
        }
    }
}

/// Query for an ad hoc diff between two versions.
#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub old: String,
    pub new: String,
}

async fn load_version(state: &AppState, id: &str) -> Result<Version, AppError> {
    state
        .repo
        .get_version(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Version {} not found", id)))
}

/// Load a version and check that it belongs to `app`.
async fn load_app_version(state: &AppState, app: &App, id: &str) -> Result<Version, AppError> {
    let version = load_version(state, id).await?;
    if version.app_id != app.id {
        return Err(AppError::Validation(format!(
            "Version {} does not belong to app {}",
            id, app.id
        )));
    }
    Ok(version)
}

/// GET /api/apps/:id/versions - Version history of an app, newest first.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<Vec<VersionSummary>> {
    let result = async {
        let order = query.sort_order()?;
        let app = load_app(&state, &id).await?;
        let versions = state.repo.list_versions(Some(app.id.as_str()), order).await?;
        Ok::<_, AppError>(versions.iter().map(VersionSummary::from).collect::<Vec<_>>())
    }
    .await;
    reply(&state, result).await
}

/// Version history of an app at one store revision.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionsSnapshot {
    pub revision_id: i64,
    pub versions: Vec<VersionSummary>,
}

/// GET /api/apps/:id/versions/watch - Version history once it moves past `since`.
///
/// Answers right away when the store is already ahead of `since`; otherwise
/// waits for the history of this app to change, up to the timeout.
pub async fn watch_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<VersionsSnapshot> {
    let result = async {
        let app = load_app(&state, &id).await?;
        let mut live = state.repo.subscribe(
            DocQuery::Versions {
                app_id: Some(app.id),
            },
            SortOrder::Descending,
        );

        let mut snapshot = live.current().await?;
        if snapshot.revision_id <= query.since {
            if let Ok(next) = tokio::time::timeout(query.wait(), live.next()).await {
                snapshot = next?;
            }
        }

        let versions = match snapshot.docs {
            QueryDocs::Versions(versions) => versions.iter().map(VersionSummary::from).collect(),
            QueryDocs::Apps(_) => Vec::new(),
        };
        Ok::<_, AppError>(VersionsSnapshot {
            revision_id: snapshot.revision_id,
            versions,
        })
    }
    .await;
    reply(&state, result).await
}

/// GET /api/versions/:id - A single version with its code.
pub async fn get_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Version> {
    let result = load_version(&state, &id).await;
    reply(&state, result).await
}

/// POST /api/apps/:id/restore - Redeploy an earlier version as a new one.
pub async fn restore_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VersionRef>,
) -> ApiResult<App> {
    let result = async {
        let app = load_app(&state, &id).await?;
        let target = load_version(&state, &request.version_id).await?;
        versions::restore(&state.manager, &target, &app)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("Version {} has no code", target.id))
            })
    }
    .await;
    reply(&state, result).await
}

/// Drop the diff selections of apps that are gone from the store.
pub(super) async fn forget_selections<'a>(
    state: &AppState,
    app_ids: impl IntoIterator<Item = &'a String>,
) {
    let mut selections = state.selections.lock().await;
    for id in app_ids {
        if selections.remove(id).is_some() {
            tracing::debug!(app_id = %id, "dropped diff selection of deleted app");
        }
    }
}

/// GET /api/apps/:id/diff-selection - Current selection.
pub async fn get_diff_selection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SelectionView> {
    let selections = state.selections.lock().await;
    let view = match selections.get(&id) {
        Some(selection) => SelectionView::of(selection, None),
        None => SelectionView::of(&DiffSelection::new(), None),
    };
    drop(selections);
    reply(&state, Ok(view)).await
}

/// POST /api/apps/:id/diff-selection - Pick a version for comparison.
pub async fn select_diff_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VersionRef>,
) -> ApiResult<SelectionView> {
    let result = async {
        let app = load_app(&state, &id).await?;
        let version = load_app_version(&state, &app, &request.version_id).await?;

        let mut selections = state.selections.lock().await;
        let selection = selections.entry(app.id.clone()).or_default();
        let outcome = selection.select(version);
        if outcome == SelectOutcome::Rejected {
            tracing::debug!(app_id = %app.id, "diff selection full, reset first");
        }
        Ok::<_, AppError>(SelectionView::of(selection, Some(outcome)))
    }
    .await;
    reply(&state, result).await
}

/// DELETE /api/apps/:id/diff-selection - Clear the selection.
pub async fn reset_diff_selection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SelectionView> {
    let mut selections = state.selections.lock().await;
    let mut selection = selections.remove(&id).unwrap_or_default();
    selection.reset();
    drop(selections);
    reply(&state, Ok(SelectionView::of(&selection, None))).await
}

/// GET /api/apps/:id/diff - Diff of the two selected versions.
pub async fn get_selection_diff(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DiffView> {
    let selections = state.selections.lock().await;
    let result = selections
        .get(&id)
        .and_then(DiffSelection::pair)
        .map(|(old, new)| DiffView::between(old, new))
        .ok_or_else(|| AppError::Validation("Select two versions to compare".to_string()));
    drop(selections);
    reply(&state, result).await
}

/// GET /api/diff?old=&new= - Diff any two versions.
pub async fn diff_versions(
    State(state): State<AppState>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<DiffView> {
    let result = async {
        let old = load_version(&state, &query.old).await?;
        let new = load_version(&state, &query.new).await?;
        Ok::<_, AppError>(DiffView::between(&old, &new))
    }
    .await;
    reply(&state, result).await
}
