//! User notifications.
//!
//! Workflows report outcomes through a `Notifier` injected at construction.
//! `ToastCenter` keeps short-lived toasts and the URLs the UI should open, and
//! the UI polls both over the API.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default lifetime of a toast.
pub const DEFAULT_TOAST_TTL: Duration = Duration::from_millis(3000);

/// Most toasts kept at once; the oldest go first.
const MAX_TOASTS: usize = 50;

/// Most URLs waiting to be opened; the oldest go first.
const MAX_OPEN_URLS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

/// A transient message shown to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: String,
    pub message: String,
    pub kind: ToastKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Sink for workflow outcomes.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: ToastKind);
    /// Ask the UI to open a URL in a new browser context.
    fn open_url(&self, url: &str);
}

#[derive(Default)]
struct Inbox {
    toasts: Vec<Toast>,
    open_urls: Vec<String>,
}

/// In-memory toast queue with expiry.
pub struct ToastCenter {
    ttl: chrono::Duration,
    inbox: Mutex<Inbox>,
}

impl ToastCenter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::milliseconds(3000)),
            inbox: Mutex::new(Inbox::default()),
        }
    }

    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Toasts that have not expired yet, oldest first.
    pub fn active(&self) -> Vec<Toast> {
        self.active_at(Utc::now())
    }

    fn active_at(&self, now: DateTime<Utc>) -> Vec<Toast> {
        let mut inbox = self.inbox();
        inbox.toasts.retain(|t| t.expires_at > now);
        inbox.toasts.clone()
    }

    /// Remove a toast before it expires. Returns false if it is already gone.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut inbox = self.inbox();
        let before = inbox.toasts.len();
        inbox.toasts.retain(|t| t.id != id);
        inbox.toasts.len() != before
    }

    fn push_toast(&self, message: &str, kind: ToastKind, now: DateTime<Utc>) {
        let mut inbox = self.inbox();
        inbox.toasts.retain(|t| t.expires_at > now);
        if inbox.toasts.len() >= MAX_TOASTS {
            let overflow = inbox.toasts.len() + 1 - MAX_TOASTS;
            inbox.toasts.drain(..overflow);
        }
        inbox.toasts.push(Toast {
            id: uuid::Uuid::new_v4().to_string(),
            message: message.to_string(),
            kind,
            created_at: now,
            expires_at: now + self.ttl,
        });
    }

    /// Drain the URLs queued for opening.
    pub fn take_open_urls(&self) -> Vec<String> {
        std::mem::take(&mut self.inbox().open_urls)
    }
}

impl Default for ToastCenter {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_TTL)
    }
}

impl Notifier for ToastCenter {
    fn notify(&self, message: &str, kind: ToastKind) {
        match kind {
            ToastKind::Error => tracing::warn!(toast = message, "error notification"),
            _ => tracing::info!(toast = message, "notification"),
        }

        self.push_toast(message, kind, Utc::now());
    }

    fn open_url(&self, url: &str) {
        tracing::debug!(url, "queued url to open");
        let mut inbox = self.inbox();
        if inbox.open_urls.len() >= MAX_OPEN_URLS {
            let overflow = inbox.open_urls.len() + 1 - MAX_OPEN_URLS;
            inbox.open_urls.drain(..overflow);
        }
        inbox.open_urls.push(url.to_string());
    }
}
