//! App model matching the frontend App interface.

use serde::{Deserialize, Serialize};

use crate::platform::ChatMessage;

/// A generated single-file web app with its deployment metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    pub app_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_uid: Option<String>,
    pub subdomain: String,
    pub hosted_url: String,
    pub code: String,
    pub prompt: String,
    pub model: String,
    pub app_title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub views: i64,
    /// Number of the latest Version record of this app
    pub version: i64,
    pub dir: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Internal revision for optimistic concurrency control
    #[serde(default)]
    pub revision: i64,
}

/// Request body for generating and deploying a new app.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppRequest {
    pub prompt: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_title: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Built-in template the prompt starts from.
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Request body for redeploying an app with new code.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppRequest {
    pub code: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Expected revision for optimistic concurrency control
    #[serde(default)]
    pub expected_revision: Option<i64>,
}

/// Request body for refining an app through the chat model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterateAppRequest {
    pub instruction: String,
    /// Earlier turns of the conversation, oldest first.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Overrides the app's own model for this request.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub expected_revision: Option<i64>,
}

/// Result of an iteration: the redeployed app and the assistant's turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationOutcome {
    pub app: App,
    pub message: ChatMessage,
}

/// Request body for deleting several apps at once.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
}

/// How a launch request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LaunchMethod {
    /// Launched through the app registry.
    Registry,
    /// Fell back to opening the hosted URL.
    Browser,
}

/// Result of a launch request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOutcome {
    pub method: LaunchMethod,
    pub url: String,
    pub app: App,
}
