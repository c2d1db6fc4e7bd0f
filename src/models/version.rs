//! Version model: immutable code snapshots of an app.

use serde::{Deserialize, Serialize};

/// Note attached to the first version of a freshly generated app.
pub const INITIAL_NOTE: &str = "Initial version";
/// Note attached to the first version of a duplicated app.
pub const DUPLICATE_NOTE: &str = "Initial version (duplicate)";

/// A snapshot of an app's code at one revision number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    pub app_id: String,
    pub code: String,
    pub version: i64,
    pub created_at: String,
    pub note: String,
}

/// Version listing entry without the code snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: String,
    pub app_id: String,
    pub version: i64,
    pub created_at: String,
    pub note: String,
}

impl From<&Version> for VersionSummary {
    fn from(v: &Version) -> Self {
        Self {
            id: v.id.clone(),
            app_id: v.app_id.clone(),
            version: v.version,
            created_at: v.created_at.clone(),
            note: v.note.clone(),
        }
    }
}

/// Request body naming a single version.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRef {
    pub version_id: String,
}

/// Note for a regular redeploy.
pub fn redeploy_note(version: i64) -> String {
    format!("Version {}", version)
}

/// Note for a redeploy that restored an older snapshot.
pub fn restore_note(restored_from: i64) -> String {
    format!("Restored from version {}", restored_from)
}

/// Characters of an instruction kept in an iteration note.
const ITERATION_NOTE_CHARS: usize = 60;

/// Note for a redeploy produced by a chat instruction.
pub fn iteration_note(instruction: &str) -> String {
    let instruction = instruction.trim();
    let mut note: String = instruction.chars().take(ITERATION_NOTE_CHARS).collect();
    if instruction.chars().count() > ITERATION_NOTE_CHARS {
        note.push_str("...");
    }
    format!("AI: {}", note)
}

/// What caused a redeploy; decides the version note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeployCause {
    Update,
    Restore(i64),
    Iteration(String),
}

impl RedeployCause {
    pub fn note(&self, new_version: i64) -> String {
        match self {
            RedeployCause::Update => redeploy_note(new_version),
            RedeployCause::Restore(from) => restore_note(*from),
            RedeployCause::Iteration(instruction) => iteration_note(instruction),
        }
    }
}
