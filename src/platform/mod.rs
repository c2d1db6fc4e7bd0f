//! Collaborator seams for the hosting platform and the chat endpoint.
//!
//! The lifecycle manager only talks to the outside world through the traits
//! in this module. `local` provides directory/SQLite-backed implementations
//! and `chat` the HTTP chat client.

pub mod chat;
pub mod local;
pub mod names;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chat::{ChatClient, ChatMessage, ChatReply, HttpChatClient};

/// The external service a call was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Chat,
    Filesystem,
    Hosting,
    Registry,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Chat => "chat",
            Service::Filesystem => "filesystem",
            Service::Hosting => "hosting",
            Service::Registry => "registry",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    NotFound { service: Service, message: String },
    AlreadyExists { service: Service, message: String },
    Unavailable { service: Service, message: String },
}

impl PlatformError {
    pub fn service(&self) -> Service {
        match self {
            PlatformError::NotFound { service, .. }
            | PlatformError::AlreadyExists { service, .. }
            | PlatformError::Unavailable { service, .. } => *service,
        }
    }

    pub fn not_found(service: Service, message: impl Into<String>) -> Self {
        PlatformError::NotFound {
            service,
            message: message.into(),
        }
    }

    pub fn already_exists(service: Service, message: impl Into<String>) -> Self {
        PlatformError::AlreadyExists {
            service,
            message: message.into(),
        }
    }

    pub fn unavailable(service: Service, message: impl Into<String>) -> Self {
        PlatformError::Unavailable {
            service,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformError::NotFound { message, .. } => write!(f, "not found: {}", message),
            PlatformError::AlreadyExists { message, .. } => {
                write!(f, "already exists: {}", message)
            }
            PlatformError::Unavailable { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for PlatformError {}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Filesystem-like object store holding deployment directories.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn mkdir(&self, name: &str) -> PlatformResult<()>;
    async fn write(&self, path: &str, content: &str) -> PlatformResult<()>;
    async fn rmdir(&self, name: &str) -> PlatformResult<()>;
}

/// A site bound to a subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedSite {
    pub subdomain: String,
}

/// Static hosting service.
#[async_trait]
pub trait Hosting: Send + Sync {
    async fn create(&self, subdomain: &str, source_dir: &str) -> PlatformResult<HostedSite>;
    async fn delete(&self, subdomain: &str) -> PlatformResult<()>;
    /// Public address of a hosted subdomain.
    fn url_for(&self, subdomain: &str) -> String;
}

/// Registration request for the app registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRegistration {
    pub name: String,
    pub index_url: String,
    pub title: String,
    pub description: String,
    pub maximize_on_start: bool,
    pub dedupe_name: bool,
}

/// An app as known by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredApp {
    pub name: String,
    pub uid: String,
}

/// Registry of launchable apps.
#[async_trait]
pub trait AppRegistry: Send + Sync {
    async fn create(&self, registration: &AppRegistration) -> PlatformResult<RegisteredApp>;
    async fn update(&self, name: &str, index_url: &str) -> PlatformResult<()>;
    async fn delete(&self, name: &str) -> PlatformResult<()>;
    async fn launch(&self, name: &str) -> PlatformResult<()>;
    fn random_name(&self) -> String;
}

/// Everything the lifecycle manager needs from the outside world.
#[derive(Clone)]
pub struct Platform {
    pub chat: Arc<dyn ChatClient>,
    pub fs: Arc<dyn FileStore>,
    pub hosting: Arc<dyn Hosting>,
    pub registry: Arc<dyn AppRegistry>,
    /// Signed-in platform user. Creating apps requires a session.
    pub user: Option<String>,
}

impl Platform {
    pub fn has_session(&self) -> bool {
        self.user.is_some()
    }
}

/// Run a cleanup call whose failure must not block the surrounding workflow.
///
/// Failures are logged at `warn` and swallowed.
pub async fn best_effort<T, F>(action: &str, call: F) -> Option<T>
where
    F: Future<Output = PlatformResult<T>>,
{
    match call.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(action, service = %e.service(), "best-effort call failed: {}", e);
            None
        }
    }
}
