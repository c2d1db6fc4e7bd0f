//! REST API module.
//!
//! Contains all API routes and handlers following the frontend contract.

mod apps;
mod catalog;
mod datastore;
mod search;
mod sites;
mod status;
mod versions;

pub use apps::*;
pub use catalog::*;
pub use datastore::*;
pub use search::*;
pub use sites::*;
pub use status::*;
pub use versions::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::SortOrder;
use crate::errors::AppError;
use crate::models::App;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Envelope a handler outcome with the store revision after the call.
async fn reply<T: Serialize>(state: &AppState, result: Result<T, AppError>) -> ApiResult<T> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    match result {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// `?order=asc|desc` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub order: Option<String>,
}

impl OrderQuery {
    fn sort_order(&self) -> Result<SortOrder, AppError> {
        match self.order.as_deref() {
            None => Ok(SortOrder::default()),
            Some(raw) => SortOrder::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("Invalid order: {}", raw))),
        }
    }
}

async fn load_app(state: &AppState, id: &str) -> Result<App, AppError> {
    state
        .repo
        .get_app(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("App {} not found", id)))
}
