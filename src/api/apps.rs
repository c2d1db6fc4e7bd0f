//! App API endpoints.

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;

use super::versions::forget_selections;
use super::{load_app, reply, ApiResult, OrderQuery};
use crate::errors::AppError;
use crate::lifecycle::BulkSelection;
use crate::models::{
    find_template, App, BulkDeleteRequest, CreateAppRequest, IterateAppRequest, IterationOutcome,
    LaunchOutcome, UpdateAppRequest,
};
use crate::AppState;

/// Outcome of a bulk delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResponse {
    pub requested: usize,
    pub deleted: usize,
}

fn requires_session() -> AppError {
    AppError::BadRequest("A platform session is required".to_string())
}

fn check_revision(app: &App, expected: Option<i64>) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != app.revision => Err(AppError::Conflict {
            message: format!(
                "Revision mismatch for app {}: expected {}, current {}",
                app.id, expected, app.revision
            ),
            current_revision: app.revision,
        }),
        _ => Ok(()),
    }
}

/// Fold a `templateId` into the prompt and default title.
fn apply_template(mut request: CreateAppRequest) -> Result<CreateAppRequest, AppError> {
    let Some(id) = request.template_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(request);
    };
    let template = find_template(id)
        .ok_or_else(|| AppError::NotFound(format!("Template {} not found", id)))?;

    request.prompt = template.compose_prompt(&request.prompt);
    if request.app_title.trim().is_empty() {
        request.app_title = template.name.to_string();
    }
    Ok(request)
}

/// GET /api/apps - List apps, newest first unless `order=asc`.
pub async fn list_apps(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<Vec<App>> {
    let result = match query.sort_order() {
        Ok(order) => state.repo.list_apps(order).await,
        Err(e) => Err(e),
    };
    reply(&state, result).await
}

/// GET /api/apps/:id - Get a single app.
pub async fn get_app(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<App> {
    let result = load_app(&state, &id).await;
    reply(&state, result).await
}

/// POST /api/apps - Generate and deploy a new app.
pub async fn create_app(
    State(state): State<AppState>,
    Json(request): Json<CreateAppRequest>,
) -> ApiResult<App> {
    let result = async {
        let request = apply_template(request)?;
        if request.prompt.trim().is_empty() {
            return Err(AppError::Validation("Prompt is required".to_string()));
        }

        state
            .manager
            .create(&request)
            .await?
            .ok_or_else(requires_session)
    }
    .await;
    reply(&state, result).await
}

/// PUT /api/apps/:id - Redeploy an app with new code.
pub async fn update_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateAppRequest>,
) -> ApiResult<App> {
    let result = async {
        if request.code.is_empty() {
            return Err(AppError::Validation("Code is required".to_string()));
        }

        let app = load_app(&state, &id).await?;
        check_revision(&app, request.expected_revision)?;

        state
            .manager
            .update(&app, &request.code, request.tags.clone())
            .await?
            .ok_or_else(|| AppError::Validation("Code is required".to_string()))
    }
    .await;
    reply(&state, result).await
}

/// POST /api/apps/:id/iterate - Apply a chat instruction and redeploy.
pub async fn iterate_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<IterateAppRequest>,
) -> ApiResult<IterationOutcome> {
    let result = async {
        if request.instruction.trim().is_empty() {
            return Err(AppError::Validation("Instruction is required".to_string()));
        }

        let app = load_app(&state, &id).await?;
        check_revision(&app, request.expected_revision)?;

        state
            .manager
            .iterate(
                &app,
                &request.instruction,
                &request.history,
                request.model.as_deref(),
            )
            .await?
            .ok_or_else(|| AppError::Validation("Instruction is required".to_string()))
    }
    .await;
    reply(&state, result).await
}

/// DELETE /api/apps/:id - Tear down and delete an app with its versions.
pub async fn delete_app(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let result = async {
        let app = load_app(&state, &id).await?;
        let versions = state
            .repo
            .list_versions(Some(app.id.as_str()), Default::default())
            .await?;
        state.manager.delete(&app, &versions).await?;
        forget_selections(&state, [&app.id]).await;
        Ok::<_, AppError>(())
    }
    .await;
    reply(&state, result).await
}

/// POST /api/apps/bulk-delete - Delete several apps, continuing past failures.
pub async fn bulk_delete_apps(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> ApiResult<BulkDeleteResponse> {
    let result = async {
        let apps = state.repo.list_apps(Default::default()).await?;
        let versions = state.repo.list_versions(None, Default::default()).await?;

        let mut selection = BulkSelection {
            selected: request.ids.iter().cloned().collect(),
            bulk_mode: true,
        };
        let requested = selection.selected.len();
        let deleted = state
            .manager
            .bulk_delete(&mut selection, &apps, &versions)
            .await;

        let remaining: HashSet<String> = state
            .repo
            .list_apps(Default::default())
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();
        let gone = request.ids.iter().filter(|id| !remaining.contains(*id));
        forget_selections(&state, gone).await;

        Ok::<_, AppError>(BulkDeleteResponse { requested, deleted })
    }
    .await;
    reply(&state, result).await
}

/// POST /api/apps/:id/duplicate - Copy an app under a new name.
pub async fn duplicate_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<App> {
    let result = async {
        let source = load_app(&state, &id).await?;
        state
            .manager
            .duplicate(&source)
            .await?
            .ok_or_else(requires_session)
    }
    .await;
    reply(&state, result).await
}

/// POST /api/apps/:id/favorite - Flip the favorite flag.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<App> {
    let result = async {
        let app = load_app(&state, &id).await?;
        state.manager.toggle_favorite(&app).await
    }
    .await;
    reply(&state, result).await
}

/// POST /api/apps/:id/views - Count a view.
pub async fn increment_views(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<App> {
    let result = async {
        let app = load_app(&state, &id).await?;
        state.manager.increment_views(&app).await
    }
    .await;
    reply(&state, result).await
}

/// POST /api/apps/:id/launch - Launch through the registry or the browser.
pub async fn launch_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<LaunchOutcome> {
    let result = async {
        let app = load_app(&state, &id).await?;
        state.manager.launch(&app).await
    }
    .await;
    reply(&state, result).await
}
