//! Static serving of locally hosted sites.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::lifecycle::INDEX_FILE;
use crate::AppState;

fn content_type(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// GET /sites/:subdomain/ - A site's index page.
pub async fn serve_site_index(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> Response {
    serve(&state, &subdomain, INDEX_FILE).await
}

/// GET /sites/:subdomain/*path - A file of a hosted site.
pub async fn serve_site_file(
    State(state): State<AppState>,
    Path((subdomain, path)): Path<(String, String)>,
) -> Response {
    let file = if path.is_empty() || path.ends_with('/') {
        format!("{}{}", path, INDEX_FILE)
    } else {
        path
    };
    serve(&state, &subdomain, &file).await
}

async fn serve(state: &AppState, subdomain: &str, file: &str) -> Response {
    let dir = match state.hosting.lookup(subdomain).await {
        Ok(Some(dir)) => dir,
        Ok(None) => return not_found(),
        Err(e) => {
            tracing::error!(subdomain, "Site lookup failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(location) = state.files.locate(&dir, file).await else {
        return not_found();
    };

    match tokio::fs::read(&location).await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type(file))], body).into_response(),
        Err(e) => {
            tracing::warn!(subdomain, file, "Failed to read site file: {}", e);
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}
