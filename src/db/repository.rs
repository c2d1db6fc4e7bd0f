//! Database repository for app and version documents.
//!
//! Uses prepared statements and transactions for data integrity. Every write
//! bumps the store revision, which wakes live queries and long-polls.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use tokio::sync::watch;

use super::{DocQuery, LiveQuery, SortOrder};
use crate::errors::AppError;
use crate::models::{App, Datastore, ImportSummary, RevisionInfo, Version, SCHEMA_VERSION};

/// Note given to the version synthesized for an imported app without history.
pub const IMPORTED_NOTE: &str = "Imported version";

const APP_COLUMNS: &str = "id, app_name, app_uid, subdomain, hosted_url, code, prompt, model, \
     app_title, tags, favorite, views, version, dir, created_at, updated_at, revision";

const VERSION_COLUMNS: &str = "id, app_id, code, version, created_at, note";

/// Current time as a fixed-width RFC 3339 string, so that text order is time order.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: Arc<watch::Sender<i64>>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            pool,
            changes: Arc::new(changes),
        }
    }

    /// Pool shared with the local platform tables.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        bump_revision(&self.pool).await?;
        self.publish().await
    }

    /// Read the committed revision and wake subscribers.
    async fn publish(&self) -> Result<i64, AppError> {
        let revision_id = self.get_revision_id().await?;
        self.changes.send_replace(revision_id);
        Ok(revision_id)
    }

    /// Subscribe to a live query.
    pub fn subscribe(&self, query: DocQuery, order: SortOrder) -> LiveQuery {
        LiveQuery::new(self.clone(), query, order, self.changes.subscribe())
    }

    /// Wait until the revision moves past `since`, or the timeout elapses.
    ///
    /// Returns the revision current at return time.
    pub async fn wait_for_change(&self, since: i64, timeout: Duration) -> Result<i64, AppError> {
        let mut changes = self.changes.subscribe();
        let current = self.get_revision_id().await?;
        if current > since {
            return Ok(current);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => {
                    let current = self.get_revision_id().await?;
                    if current > since {
                        return Ok(current);
                    }
                }
                Ok(Err(_)) | Err(_) => return self.get_revision_id().await,
            }
        }
    }

    /// Export every app and version.
    pub async fn get_datastore(&self) -> Result<Datastore, AppError> {
        let meta =
            sqlx::query("SELECT schema_version, revision_id, generated_at FROM meta WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;

        let apps = self.list_apps(SortOrder::Ascending).await?;
        let versions = self.list_versions(None, SortOrder::Ascending).await?;

        Ok(Datastore {
            schema_version: meta.get("schema_version"),
            revision_id: meta.get("revision_id"),
            generated_at: meta.get("generated_at"),
            apps,
            versions,
        })
    }

    /// Import an export next to the existing documents.
    ///
    /// Imported apps get fresh ids. Their versions are renumbered 1..n in their
    /// original order, and an app without history gets one version holding its
    /// current code.
    ///
    /// Imported apps arrive detached: the deployment they point at belongs to
    /// whoever exported them, so directory, subdomain, registry entry and URL
    /// are cleared. The next redeploy gives them a deployment of their own.
    pub async fn import_datastore(&self, data: &Datastore) -> Result<ImportSummary, AppError> {
        if data.schema_version > SCHEMA_VERSION {
            return Err(AppError::Validation(format!(
                "Unsupported schema version {} (expected at most {})",
                data.schema_version, SCHEMA_VERSION
            )));
        }

        let now = timestamp();
        let mut summary = ImportSummary {
            apps: 0,
            versions: 0,
        };

        let mut tx = self.pool.begin().await?;

        for source in &data.apps {
            let mut history: Vec<&Version> = data
                .versions
                .iter()
                .filter(|v| v.app_id == source.id)
                .collect();
            history.sort_by_key(|v| v.version);

            let mut app = detached(source);
            app.id = uuid::Uuid::new_v4().to_string();
            app.revision = 1;
            app.version = history.len().max(1) as i64;
            if app.created_at.is_empty() {
                app.created_at = now.clone();
            }
            insert_app_row(&mut *tx, &app).await?;

            if history.is_empty() {
                let version = Version {
                    id: uuid::Uuid::new_v4().to_string(),
                    app_id: app.id.clone(),
                    code: app.code.clone(),
                    version: 1,
                    created_at: app.created_at.clone(),
                    note: IMPORTED_NOTE.to_string(),
                };
                insert_version_row(&mut *tx, &version).await?;
                summary.versions += 1;
            }

            for (index, source_version) in history.into_iter().enumerate() {
                let version = Version {
                    id: uuid::Uuid::new_v4().to_string(),
                    app_id: app.id.clone(),
                    version: index as i64 + 1,
                    ..source_version.clone()
                };
                insert_version_row(&mut *tx, &version).await?;
                summary.versions += 1;
            }

            summary.apps += 1;
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        self.publish().await?;

        tracing::info!(
            apps = summary.apps,
            versions = summary.versions,
            "Imported datastore"
        );
        Ok(summary)
    }

    // ==================== APP OPERATIONS ====================

    /// List all apps by creation time.
    pub async fn list_apps(&self, order: SortOrder) -> Result<Vec<App>, AppError> {
        let sql = format!(
            "SELECT {} FROM apps ORDER BY created_at {o}, rowid {o}",
            APP_COLUMNS,
            o = order.sql()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(app_from_row).collect())
    }

    /// Get an app by ID.
    pub async fn get_app(&self, id: &str) -> Result<Option<App>, AppError> {
        let sql = format!("SELECT {} FROM apps WHERE id = ?", APP_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(app_from_row))
    }

    /// Write an app document.
    ///
    /// An app without an id is inserted with a fresh id at revision 1.
    /// Otherwise the stored document is replaced only if its revision still
    /// equals `app.revision`; the returned document carries the next revision.
    pub async fn put_app(&self, app: &App) -> Result<App, AppError> {
        if app.id.is_empty() {
            let mut created = app.clone();
            created.id = uuid::Uuid::new_v4().to_string();
            created.revision = 1;
            if created.created_at.is_empty() {
                created.created_at = timestamp();
            }

            insert_app_row(&self.pool, &created).await?;
            self.increment_revision().await?;
            return Ok(created);
        }

        let rows = update_app_row(&self.pool, app).await?;
        if rows == 0 {
            return Err(self.stale_write(&app.id, app.revision).await);
        }

        self.increment_revision().await?;
        Ok(App {
            revision: app.revision + 1,
            ..app.clone()
        })
    }

    /// Delete an app document. Its versions are left to the caller.
    pub async fn delete_app(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM apps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("App {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Error for an app write whose revision check matched no row.
    async fn stale_write(&self, id: &str, expected: i64) -> AppError {
        match self.get_app(id).await {
            Ok(Some(current)) => AppError::Conflict {
                message: format!(
                    "Revision mismatch for app {}: expected {}, current {}",
                    id, expected, current.revision
                ),
                current_revision: current.revision,
            },
            Ok(None) => AppError::NotFound(format!("App {} not found", id)),
            Err(e) => e,
        }
    }

    // ==================== VERSION OPERATIONS ====================

    /// List versions, optionally for one app only, by creation time.
    pub async fn list_versions(
        &self,
        app_id: Option<&str>,
        order: SortOrder,
    ) -> Result<Vec<Version>, AppError> {
        let filter = if app_id.is_some() {
            "WHERE app_id = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM versions {} ORDER BY created_at {o}, version {o}",
            VERSION_COLUMNS,
            filter,
            o = order.sql()
        );

        let mut query = sqlx::query(&sql);
        if let Some(app_id) = app_id {
            query = query.bind(app_id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(version_from_row).collect())
    }

    /// Get a version by ID.
    pub async fn get_version(&self, id: &str) -> Result<Option<Version>, AppError> {
        let sql = format!("SELECT {} FROM versions WHERE id = ?", VERSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(version_from_row))
    }

    /// Insert a version document. Versions are immutable once written.
    pub async fn put_version(&self, version: &Version) -> Result<Version, AppError> {
        let mut created = version.clone();
        if created.id.is_empty() {
            created.id = uuid::Uuid::new_v4().to_string();
        }
        if created.created_at.is_empty() {
            created.created_at = timestamp();
        }

        if let Err(e) = insert_version_row(&self.pool, &created).await {
            return Err(duplicate_version(e, &created));
        }

        self.increment_revision().await?;
        Ok(created)
    }

    /// Delete a version document.
    pub async fn delete_version(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM versions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Version {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    // ==================== TRANSACTIONAL WRITES ====================

    /// Insert a new app together with its first version.
    pub async fn insert_app_with_version(
        &self,
        app: &App,
        note: &str,
    ) -> Result<(App, Version), AppError> {
        let mut created = app.clone();
        if created.id.is_empty() {
            created.id = uuid::Uuid::new_v4().to_string();
        }
        if created.created_at.is_empty() {
            created.created_at = timestamp();
        }
        created.revision = 1;

        let version = Version {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: created.id.clone(),
            code: created.code.clone(),
            version: created.version,
            created_at: created.created_at.clone(),
            note: note.to_string(),
        };

        let mut tx = self.pool.begin().await?;
        insert_app_row(&mut *tx, &created).await?;
        insert_version_row(&mut *tx, &version).await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        self.publish().await?;
        Ok((created, version))
    }

    /// Record a redeploy: append the version numbered `app.version` and replace
    /// the app document, both or neither.
    ///
    /// `app.revision` must be the revision the caller read.
    pub async fn commit_redeploy(&self, app: &App, note: &str) -> Result<(App, Version), AppError> {
        let version = Version {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app.id.clone(),
            code: app.code.clone(),
            version: app.version,
            created_at: app.updated_at.clone().unwrap_or_else(timestamp),
            note: note.to_string(),
        };

        let mut tx = self.pool.begin().await?;

        if let Err(e) = insert_version_row(&mut *tx, &version).await {
            tx.rollback().await?;
            return Err(duplicate_version(e, &version));
        }

        let rows = update_app_row(&mut *tx, app).await?;
        if rows == 0 {
            tx.rollback().await?;
            return Err(self.stale_write(&app.id, app.revision).await);
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        self.publish().await?;
        Ok((
            App {
                revision: app.revision + 1,
                ..app.clone()
            },
            version,
        ))
    }
}

// Statement helpers usable on the pool or inside a transaction

async fn bump_revision<'e, E>(executor: E) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(timestamp())
        .execute(executor)
        .await?;
    Ok(())
}

async fn insert_app_row<'e, E>(executor: E, app: &App) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO apps (
            id, app_name, app_uid, subdomain, hosted_url, code, prompt, model,
            app_title, tags, favorite, views, version, dir, created_at, updated_at, revision
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&app.id)
    .bind(&app.app_name)
    .bind(&app.app_uid)
    .bind(&app.subdomain)
    .bind(&app.hosted_url)
    .bind(&app.code)
    .bind(&app.prompt)
    .bind(&app.model)
    .bind(&app.app_title)
    .bind(tags_json(&app.tags))
    .bind(app.favorite as i32)
    .bind(app.views)
    .bind(app.version)
    .bind(&app.dir)
    .bind(&app.created_at)
    .bind(&app.updated_at)
    .bind(app.revision)
    .execute(executor)
    .await?;
    Ok(())
}

/// Conditional replace of an app row; returns the number of rows written.
async fn update_app_row<'e, E>(executor: E, app: &App) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"UPDATE apps SET
            app_name = ?, app_uid = ?, subdomain = ?, hosted_url = ?, code = ?,
            prompt = ?, model = ?, app_title = ?, tags = ?, favorite = ?, views = ?,
            version = ?, dir = ?, updated_at = ?, revision = revision + 1
        WHERE id = ? AND revision = ?"#,
    )
    .bind(&app.app_name)
    .bind(&app.app_uid)
    .bind(&app.subdomain)
    .bind(&app.hosted_url)
    .bind(&app.code)
    .bind(&app.prompt)
    .bind(&app.model)
    .bind(&app.app_title)
    .bind(tags_json(&app.tags))
    .bind(app.favorite as i32)
    .bind(app.views)
    .bind(app.version)
    .bind(&app.dir)
    .bind(&app.updated_at)
    .bind(&app.id)
    .bind(app.revision)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_version_row<'e, E>(executor: E, version: &Version) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO versions (id, app_id, code, version, created_at, note) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&version.id)
    .bind(&version.app_id)
    .bind(&version.code)
    .bind(version.version)
    .bind(&version.created_at)
    .bind(&version.note)
    .execute(executor)
    .await?;
    Ok(())
}

fn duplicate_version(err: sqlx::Error, version: &Version) -> AppError {
    let unique = err
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false);
    if unique {
        AppError::Conflict {
            message: format!(
                "Version {} already exists for app {}",
                version.version, version.app_id
            ),
            current_revision: version.version - 1,
        }
    } else {
        err.into()
    }
}

// Helper functions for row conversion

/// Copy of an exported app without any tie to a deployment.
fn detached(source: &App) -> App {
    App {
        app_name: String::new(),
        app_uid: None,
        subdomain: String::new(),
        hosted_url: String::new(),
        dir: String::new(),
        ..source.clone()
    }
}

fn app_from_row(row: &SqliteRow) -> App {
    let favorite: i32 = row.get("favorite");
    let tags_str: String = row.get("tags");
    App {
        id: row.get("id"),
        app_name: row.get("app_name"),
        app_uid: row.get("app_uid"),
        subdomain: row.get("subdomain"),
        hosted_url: row.get("hosted_url"),
        code: row.get("code"),
        prompt: row.get("prompt"),
        model: row.get("model"),
        app_title: row.get("app_title"),
        tags: parse_json_array(&tags_str),
        favorite: favorite != 0,
        views: row.get("views"),
        version: row.get("version"),
        dir: row.get("dir"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        revision: row.get("revision"),
    }
}

fn version_from_row(row: &SqliteRow) -> Version {
    Version {
        id: row.get("id"),
        app_id: row.get("app_id"),
        code: row.get("code"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        note: row.get("note"),
    }
}

fn tags_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_default()
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
