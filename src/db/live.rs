//! Live queries over the document store.
//!
//! A `LiveQuery` re-runs its query whenever the store's revision counter moves
//! and only delivers a new snapshot when the matching documents changed.

use tokio::sync::watch;

use super::Repository;
use crate::errors::AppError;
use crate::models::{App, Version};

/// Which documents a live query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocQuery {
    /// Every app.
    Apps,
    /// Versions, optionally restricted to one app.
    Versions { app_id: Option<String> },
}

/// Order of a listing by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortOrder::Ascending),
            "desc" | "descending" => Some(SortOrder::Descending),
            _ => None,
        }
    }
}

/// Documents matched by a live query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDocs {
    Apps(Vec<App>),
    Versions(Vec<Version>),
}

/// One delivery of a live query.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub revision_id: i64,
    pub docs: QueryDocs,
}

/// Subscription that re-delivers matching documents after each change.
pub struct LiveQuery {
    repo: Repository,
    query: DocQuery,
    order: SortOrder,
    changes: watch::Receiver<i64>,
    last: Option<QueryDocs>,
}

impl LiveQuery {
    pub(crate) fn new(
        repo: Repository,
        query: DocQuery,
        order: SortOrder,
        changes: watch::Receiver<i64>,
    ) -> Self {
        Self {
            repo,
            query,
            order,
            changes,
            last: None,
        }
    }

    async fn fetch(&self) -> Result<QueryDocs, AppError> {
        Ok(match &self.query {
            DocQuery::Apps => QueryDocs::Apps(self.repo.list_apps(self.order).await?),
            DocQuery::Versions { app_id } => QueryDocs::Versions(
                self.repo
                    .list_versions(app_id.as_deref(), self.order)
                    .await?,
            ),
        })
    }

    /// Current matching documents.
    pub async fn current(&mut self) -> Result<Snapshot, AppError> {
        self.changes.mark_unchanged();
        let revision_id = self.repo.get_revision_id().await?;
        let docs = self.fetch().await?;
        self.last = Some(docs.clone());
        Ok(Snapshot { revision_id, docs })
    }

    /// Wait until the matching documents differ from the last delivery.
    pub async fn next(&mut self) -> Result<Snapshot, AppError> {
        if self.last.is_none() {
            return self.current().await;
        }
        loop {
            self.changes
                .changed()
                .await
                .map_err(|_| AppError::Internal("Document store closed".to_string()))?;
            let revision_id = self.repo.get_revision_id().await?;
            let docs = self.fetch().await?;
            if self.last.as_ref() != Some(&docs) {
                self.last = Some(docs.clone());
                return Ok(Snapshot { revision_id, docs });
            }
        }
    }
}
