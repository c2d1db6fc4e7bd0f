//! Version history: diff selection, diffs and restore.

mod diff;

pub use diff::*;

use serde::Serialize;

use crate::errors::AppError;
use crate::lifecycle::AppManager;
use crate::models::{App, RedeployCause, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionState {
    Empty,
    OneSelected,
    TwoSelected,
}

/// What a pick did to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectOutcome {
    FilledOld,
    FilledNew,
    /// The version already fills the only slot.
    Unchanged,
    /// Both slots are full; reset first.
    Rejected,
}

/// Two versions picked for comparison.
///
/// The first pick is "old" and the second distinct pick is "new", whatever
/// their version numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSelection {
    old: Option<Version>,
    new: Option<Version>,
}

impl DiffSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        match (&self.old, &self.new) {
            (None, _) => SelectionState::Empty,
            (Some(_), None) => SelectionState::OneSelected,
            (Some(_), Some(_)) => SelectionState::TwoSelected,
        }
    }

    pub fn select(&mut self, version: Version) -> SelectOutcome {
        match (&self.old, &self.new) {
            (None, _) => {
                self.old = Some(version);
                SelectOutcome::FilledOld
            }
            (Some(old), None) if old.id == version.id => SelectOutcome::Unchanged,
            (Some(_), None) => {
                self.new = Some(version);
                SelectOutcome::FilledNew
            }
            (Some(_), Some(_)) => SelectOutcome::Rejected,
        }
    }

    pub fn old(&self) -> Option<&Version> {
        self.old.as_ref()
    }

    pub fn new_version(&self) -> Option<&Version> {
        self.new.as_ref()
    }

    pub fn pair(&self) -> Option<(&Version, &Version)> {
        self.old.as_ref().zip(self.new.as_ref())
    }

    /// True when the "old" pick has a higher version number than the "new" one.
    pub fn is_inverted(&self) -> bool {
        self.pair()
            .map(|(old, new)| old.version > new.version)
            .unwrap_or(false)
    }

    pub fn reset(&mut self) {
        self.old = None;
        self.new = None;
    }
}

/// Redeploy `app` with the code of an earlier version.
///
/// History is append-only: the restored code becomes a new version on top.
pub async fn restore(
    manager: &AppManager,
    target: &Version,
    app: &App,
) -> Result<Option<App>, AppError> {
    if target.app_id != app.id {
        return Err(AppError::Validation(format!(
            "Version {} does not belong to app {}",
            target.id, app.id
        )));
    }

    tracing::info!(app_id = %app.id, from = target.version, "Restoring version");
    manager
        .redeploy(app, &target.code, None, RedeployCause::Restore(target.version))
        .await
}
