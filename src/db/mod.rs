//! Database module for SQLite persistence.
//!
//! SQLite is the document store for apps and versions, and also backs the
//! local hosting and registry tables.

mod live;
mod repository;

pub use live::*;
pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS apps (
            id TEXT PRIMARY KEY,
            app_name TEXT NOT NULL,
            app_uid TEXT,
            subdomain TEXT NOT NULL,
            hosted_url TEXT NOT NULL,
            code TEXT NOT NULL,
            prompt TEXT NOT NULL,
            model TEXT NOT NULL,
            app_title TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            favorite INTEGER NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            dir TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            revision INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    // No foreign key to apps; the lifecycle manager deletes versions first.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            id TEXT PRIMARY KEY,
            app_id TEXT NOT NULL,
            code TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            UNIQUE (app_id, version)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sites (
            subdomain TEXT PRIMARY KEY,
            dir TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registry_apps (
            name TEXT PRIMARY KEY,
            uid TEXT NOT NULL,
            index_url TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            maximize_on_start INTEGER NOT NULL DEFAULT 1,
            launches INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_apps_created_at ON apps(created_at);
        CREATE INDEX IF NOT EXISTS idx_versions_app_id ON versions(app_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
