// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

/// Error taxonomy of the provider layer.
///
/// Only [`Transient`](Self::Transient) and [`RateLimited`](Self::RateLimited)
/// are candidates for retry; everything else surfaces to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Timeouts, 5xx responses, connection resets.
    #[error("transient provider failure: {0}")]
    Transient(String),
    /// HTTP 429.  `retry_after` carries the provider's backoff hint.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    /// 4xx other than 401/403/429 — the request itself is wrong.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// 401 / 403.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// The call was canceled by the caller's scope.
    #[error("provider call canceled")]
    Canceled,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    /// Classify an HTTP error status into the taxonomy.
    pub fn from_status(status: u16, detail: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let detail = detail.into();
        match status {
            429 => Self::RateLimited { message: detail, retry_after },
            401 | 403 => Self::AuthFailed(detail),
            400..=499 => Self::InvalidRequest(detail),
            _ => Self::Transient(format!("http {status}: {detail}")),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // Transport-level failures (timeouts, resets, DNS) are all worth a
        // retry; malformed response bodies are treated the same way since a
        // repeat call usually returns a clean payload.
        Self::Transient(e.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited_with_hint() {
        let e = ProviderError::from_status(429, "slow down", Some(Duration::from_secs(12)));
        match e {
            ProviderError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(12)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn auth_statuses_map_to_auth_failed() {
        assert!(matches!(ProviderError::from_status(401, "", None), ProviderError::AuthFailed(_)));
        assert!(matches!(ProviderError::from_status(403, "", None), ProviderError::AuthFailed(_)));
    }

    #[test]
    fn other_4xx_is_invalid_request() {
        assert!(matches!(
            ProviderError::from_status(422, "bad schema", None),
            ProviderError::InvalidRequest(_)
        ));
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(matches!(ProviderError::from_status(500, "", None), ProviderError::Transient(_)));
        assert!(matches!(ProviderError::from_status(503, "", None), ProviderError::Transient(_)));
    }

    #[test]
    fn retryability() {
        assert!(ProviderError::Transient("x".into()).is_retryable());
        assert!(ProviderError::RateLimited { message: "x".into(), retry_after: None }.is_retryable());
        assert!(!ProviderError::InvalidRequest("x".into()).is_retryable());
        assert!(!ProviderError::AuthFailed("x".into()).is_retryable());
        assert!(!ProviderError::Canceled.is_retryable());
    }
}
