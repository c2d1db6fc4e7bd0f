//! Search API endpoints.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::models::App;
use crate::search::MAX_OFFSET;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
    /// Only return apps carrying this tag.
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_limit() -> usize {
    20
}

/// Search result with apps and metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Single search result item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub app: App,
    pub score: f32,
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /api/search - Search apps by title, name, prompt and tags.
pub async fn search_apps(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    // Limit the page size and depth
    let limit = params.limit.min(MAX_SEARCH_LIMIT);
    let offset = params.offset.min(MAX_OFFSET);
    let tag = params.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());

    // Perform search
    let page = match state.search.search(&params.q, tag, limit, offset) {
        Ok(page) => page,
        Err(e) => return error(e, revision_id),
    };

    // Hits the index has not caught up with yet are skipped
    let mut results = Vec::new();
    for sr in page.results {
        match state.repo.get_app(&sr.app_id).await {
            Ok(Some(app)) => results.push(SearchResultItem {
                app,
                score: sr.score,
            }),
            Ok(None) => {}
            Err(e) => return error(e, revision_id),
        }
    }

    success(
        SearchResponse {
            results,
            total: page.total,
            limit,
            offset,
        },
        revision_id,
    )
}
