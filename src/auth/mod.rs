//! PSK-based authentication for the `/api` routes.
//!
//! Hosted sites under `/sites` and the health check stay public; the router
//! only puts this layer on the API. Keys are compared in constant time.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AppErrorWithRevision};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Pre-shared key check for API requests.
///
/// Without a configured key every request passes (local development).
#[derive(Clone, Default)]
pub struct PskGuard {
    expected: Option<Arc<str>>,
}

impl PskGuard {
    pub fn new(psk: Option<&str>) -> Self {
        Self {
            expected: psk.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Accept `X-API-Key: <psk>` or `Authorization: Bearer <psk>`.
    ///
    /// An `X-API-Key` header, when present, is the only credential looked at.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let Some(expected) = self.expected.as_deref() else {
            return Ok(());
        };

        if let Some(key) = headers.get(API_KEY_HEADER) {
            let key = key.to_str().unwrap_or_default();
            return if constant_time_compare(key, expected) {
                Ok(())
            } else {
                Err(AppError::Unauthorized("Invalid API key".to_string()))
            };
        }

        match bearer_token(headers) {
            Some(token) if constant_time_compare(token, expected) => Ok(()),
            _ => Err(AppError::Unauthorized("Missing or invalid API key".to_string())),
        }
    }
}

/// Middleware rejecting API requests that fail the PSK check.
pub async fn require_psk(
    State(guard): State<PskGuard>,
    request: Request,
    next: Next,
) -> Response {
    match guard.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(error) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Rejected API request: {}",
                error
            );
            AppErrorWithRevision {
                error,
                revision_id: 0,
            }
            .into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
