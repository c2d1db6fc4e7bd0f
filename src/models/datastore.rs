//! Datastore export model.

use serde::{Deserialize, Serialize};

use super::{App, Version};

/// Current export schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Every app and version, as exported and imported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datastore {
    pub schema_version: i32,
    pub generated_at: String,
    pub revision_id: i64,
    pub apps: Vec<App>,
    #[serde(default)]
    pub versions: Vec<Version>,
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}

/// Outcome of an import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub apps: usize,
    pub versions: usize,
}
