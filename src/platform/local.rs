//! Self-hosted platform implementations.
//!
//! Deployment directories live under a local root, hosted sites and registry
//! entries live in SQLite tables next to the app documents, and sites are
//! served by the `/sites` routes.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::{
    names, AppRegistration, AppRegistry, FileStore, HostedSite, Hosting, PlatformError,
    PlatformResult, RegisteredApp, Service,
};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

fn db_error(service: Service, err: sqlx::Error) -> PlatformError {
    PlatformError::unavailable(service, format!("storage error: {}", err))
}

/// Relative path made only of normal components.
fn safe_relative(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    if path.is_empty() || candidate.is_absolute() {
        return None;
    }
    if candidate
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        Some(candidate.to_path_buf())
    } else {
        None
    }
}

// ==================== FILESYSTEM ====================

/// Deployment directories under a local root.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub async fn open(root: &Path) -> PlatformResult<Self> {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            PlatformError::unavailable(
                Service::Filesystem,
                format!("failed to create {}: {}", root.display(), e),
            )
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve(&self, path: &str) -> PlatformResult<PathBuf> {
        safe_relative(path)
            .map(|relative| self.root.join(relative))
            .ok_or_else(|| {
                PlatformError::unavailable(Service::Filesystem, format!("invalid path: {}", path))
            })
    }

    /// Absolute path of a file inside a deployment directory, if it exists.
    pub async fn locate(&self, dir: &str, file: &str) -> Option<PathBuf> {
        let path = self.resolve(&format!("{}/{}", dir, file)).ok()?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn mkdir(&self, name: &str) -> PlatformResult<()> {
        let path = self.resolve(name)?;
        tokio::fs::create_dir(&path).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => PlatformError::already_exists(Service::Filesystem, name),
            _ => PlatformError::unavailable(Service::Filesystem, e.to_string()),
        })
    }

    async fn write(&self, path: &str, content: &str) -> PlatformResult<()> {
        let target = self.resolve(path)?;
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PlatformError::not_found(Service::Filesystem, path),
                _ => PlatformError::unavailable(Service::Filesystem, e.to_string()),
            })
    }

    async fn rmdir(&self, name: &str) -> PlatformResult<()> {
        let path = self.resolve(name)?;
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PlatformError::not_found(Service::Filesystem, name),
                _ => PlatformError::unavailable(Service::Filesystem, e.to_string()),
            })
    }
}

// ==================== HOSTING ====================

/// Subdomain to directory bindings, served under `/sites/{subdomain}/`.
#[derive(Clone)]
pub struct LocalHosting {
    pool: SqlitePool,
    public_url: String,
}

impl LocalHosting {
    pub fn new(pool: SqlitePool, public_url: &str) -> Self {
        Self {
            pool,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Directory currently bound to a subdomain.
    pub async fn lookup(&self, subdomain: &str) -> PlatformResult<Option<String>> {
        let row = sqlx::query("SELECT dir FROM sites WHERE subdomain = ?")
            .bind(subdomain)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(Service::Hosting, e))?;
        Ok(row.map(|r| r.get("dir")))
    }
}

#[async_trait]
impl Hosting for LocalHosting {
    async fn create(&self, subdomain: &str, source_dir: &str) -> PlatformResult<HostedSite> {
        if subdomain.is_empty() || names::slugify(subdomain) != subdomain {
            return Err(PlatformError::unavailable(
                Service::Hosting,
                format!("invalid subdomain: {:?}", subdomain),
            ));
        }

        sqlx::query("INSERT INTO sites (subdomain, dir, created_at) VALUES (?, ?, ?)")
            .bind(subdomain)
            .bind(source_dir)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PlatformError::already_exists(Service::Hosting, subdomain)
                } else {
                    db_error(Service::Hosting, e)
                }
            })?;

        tracing::debug!(subdomain, dir = source_dir, "site hosted");
        Ok(HostedSite {
            subdomain: subdomain.to_string(),
        })
    }

    async fn delete(&self, subdomain: &str) -> PlatformResult<()> {
        let result = sqlx::query("DELETE FROM sites WHERE subdomain = ?")
            .bind(subdomain)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(Service::Hosting, e))?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::not_found(Service::Hosting, subdomain));
        }
        Ok(())
    }

    fn url_for(&self, subdomain: &str) -> String {
        format!("{}/sites/{}/", self.public_url, subdomain)
    }
}

// ==================== REGISTRY ====================

/// Registry entries stored in SQLite.
#[derive(Clone)]
pub struct LocalRegistry {
    pool: SqlitePool,
}

/// Registry row, exposed for inspection.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub uid: String,
    pub index_url: String,
    pub title: String,
    pub launches: i64,
}

impl LocalRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub async fn get(&self, name: &str) -> PlatformResult<Option<RegistryEntry>> {
        let row = sqlx::query(
            "SELECT name, uid, index_url, title, launches FROM registry_apps WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(Service::Registry, e))?;

        Ok(row.map(|r| RegistryEntry {
            name: r.get("name"),
            uid: r.get("uid"),
            index_url: r.get("index_url"),
            title: r.get("title"),
            launches: r.get("launches"),
        }))
    }

    async fn insert(&self, name: &str, registration: &AppRegistration) -> Result<String, sqlx::Error> {
        let uid = format!("app-{}", uuid::Uuid::new_v4());
        sqlx::query(
            "INSERT INTO registry_apps (name, uid, index_url, title, description, maximize_on_start, launches, created_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?)"
        )
        .bind(name)
        .bind(&uid)
        .bind(&registration.index_url)
        .bind(&registration.title)
        .bind(&registration.description)
        .bind(registration.maximize_on_start as i32)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(uid)
    }
}

/// Upper bound on `-N` suffixes tried when deduplicating a name.
const MAX_DEDUPE_ATTEMPTS: u32 = 50;

#[async_trait]
impl AppRegistry for LocalRegistry {
    async fn create(&self, registration: &AppRegistration) -> PlatformResult<RegisteredApp> {
        if registration.name.trim().is_empty() {
            return Err(PlatformError::unavailable(Service::Registry, "app name is empty"));
        }

        let attempts = if registration.dedupe_name {
            MAX_DEDUPE_ATTEMPTS
        } else {
            1
        };

        for attempt in 1..=attempts {
            let name = if attempt == 1 {
                registration.name.clone()
            } else {
                format!("{}-{}", registration.name, attempt)
            };

            match self.insert(&name, registration).await {
                Ok(uid) => return Ok(RegisteredApp { name, uid }),
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(db_error(Service::Registry, e)),
            }
        }

        Err(PlatformError::already_exists(
            Service::Registry,
            registration.name.clone(),
        ))
    }

    async fn update(&self, name: &str, index_url: &str) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE registry_apps SET index_url = ? WHERE name = ?")
            .bind(index_url)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(Service::Registry, e))?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::not_found(Service::Registry, name));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> PlatformResult<()> {
        let result = sqlx::query("DELETE FROM registry_apps WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(Service::Registry, e))?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::not_found(Service::Registry, name));
        }
        Ok(())
    }

    async fn launch(&self, name: &str) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE registry_apps SET launches = launches + 1 WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(Service::Registry, e))?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::not_found(Service::Registry, name));
        }
        Ok(())
    }

    fn random_name(&self) -> String {
        names::random_name()
    }
}
