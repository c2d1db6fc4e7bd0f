//! Generation model catalog.

use serde::Serialize;
use serde_json::Value;

/// Provider filter value that matches every model.
pub const ALL_PROVIDERS: &str = "All";

/// A chat model that can generate apps.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
}

impl ModelInfo {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            provider: categorize_model(id).to_string(),
        }
    }
}

/// Guess the provider of a model from its identifier.
pub fn categorize_model(model_id: &str) -> &'static str {
    let id = model_id.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| id.contains(n));

    if any(&["gpt", "o1", "o3", "chatgpt"]) {
        "OpenAI"
    } else if any(&["claude"]) {
        "Anthropic"
    } else if any(&["gemini", "gemma"]) {
        "Google"
    } else if any(&["llama"]) {
        "Meta"
    } else if any(&["mistral", "mixtral"]) {
        "Mistral"
    } else if any(&["deepseek"]) {
        "DeepSeek"
    } else if any(&["grok"]) {
        "xAI"
    } else if any(&["qwen"]) {
        "Alibaba"
    } else {
        "Other"
    }
}

/// Models offered when the endpoint's listing is unavailable.
pub fn fallback_models() -> Vec<ModelInfo> {
    ["gpt-4o-mini", "gpt-4o", "claude-3-5-sonnet", "gemini-pro"]
        .iter()
        .map(|id| ModelInfo::new(id))
        .collect()
}

/// Parse a model listing.
///
/// Accepts a bare array, `{ "models": [...] }` or `{ "data": [...] }`, where
/// entries are either strings or objects with an `id`.
pub fn parse_model_listing(body: &Value) -> Vec<ModelInfo> {
    let entries = body
        .as_array()
        .or_else(|| body.get("models").and_then(Value::as_array))
        .or_else(|| body.get("data").and_then(Value::as_array));

    entries
        .map(|list| {
            list.iter()
                .filter_map(|entry| match entry {
                    Value::String(id) => Some(id.as_str()),
                    other => other.get("id").and_then(Value::as_str),
                })
                .map(ModelInfo::new)
                .collect()
        })
        .unwrap_or_default()
}

/// Provider names, sorted, with `All` first.
pub fn providers(models: &[ModelInfo]) -> Vec<String> {
    let mut names: Vec<String> = models.iter().map(|m| m.provider.clone()).collect();
    names.sort();
    names.dedup();
    names.insert(0, ALL_PROVIDERS.to_string());
    names
}

/// Models belonging to one provider, or all of them for `All`.
pub fn filter_by_provider(models: &[ModelInfo], provider: &str) -> Vec<ModelInfo> {
    if provider == ALL_PROVIDERS {
        return models.to_vec();
    }
    models
        .iter()
        .filter(|m| m.provider == provider)
        .cloned()
        .collect()
}
