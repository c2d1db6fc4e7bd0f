//! Model and template catalog API endpoints.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{reply, ApiResult};
use crate::models::{
    fallback_models, filter_by_category, filter_by_provider, parse_model_listing, providers,
    template_categories, templates, ModelInfo, Template, ALL_CATEGORIES, ALL_PROVIDERS,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    pub provider: Option<String>,
}

/// Models available for generation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalog {
    pub models: Vec<ModelInfo>,
    /// Every provider in the listing, `All` first.
    pub providers: Vec<String>,
    pub default_model: String,
    /// True when the endpoint listing was unavailable.
    pub fallback: bool,
}

/// GET /api/models - List generation models, optionally for one provider.
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ModelsQuery>,
) -> ApiResult<ModelCatalog> {
    let listing = match state.chat.list_models().await {
        Ok(body) => parse_model_listing(&body),
        Err(e) => {
            tracing::warn!("Model listing unavailable, using fallback: {}", e);
            Vec::new()
        }
    };
    let fallback = listing.is_empty();
    let models = if fallback { fallback_models() } else { listing };

    let provider = query.provider.as_deref().unwrap_or(ALL_PROVIDERS);
    let catalog = ModelCatalog {
        providers: providers(&models),
        models: filter_by_provider(&models, provider),
        default_model: state.config.default_model.clone(),
        fallback,
    };
    reply(&state, Ok(catalog)).await
}

#[derive(Debug, Deserialize)]
pub struct TemplatesQuery {
    pub category: Option<String>,
}

/// Starter templates for the create dialog.
#[derive(Debug, Serialize)]
pub struct TemplateCatalog {
    pub templates: Vec<Template>,
    /// Every template category, `All` first.
    pub categories: Vec<String>,
}

/// GET /api/templates - List starter templates, optionally for one category.
pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplatesQuery>,
) -> ApiResult<TemplateCatalog> {
    let category = query.category.as_deref().unwrap_or(ALL_CATEGORIES);
    let catalog = TemplateCatalog {
        templates: filter_by_category(templates(), category),
        categories: template_categories(templates()),
    };
    reply(&state, Ok(catalog)).await
}
