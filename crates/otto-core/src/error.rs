// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use otto_model::ProviderError;
use otto_store::StoreError;

/// Errors surfaced by the engine to its callers.
///
/// Tool errors never appear here — they are captured as tool messages and
/// fed back to the model.  `Transient` and `RateLimited` provider failures
/// only surface (as [`Provider`](Self::Provider)) once retries are
/// exhausted.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error(transparent)]
    Provider(ProviderError),
    /// The caller's scope was canceled or a deadline fired.  Work committed
    /// before the cancellation remains persisted.
    #[error("turn canceled")]
    Canceled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Validation(what) => Self::Validation(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Canceled => Self::Canceled,
            other => Self::Provider(other),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_through() {
        let e: EngineError = StoreError::NotFound("chat x".into()).into();
        assert!(matches!(e, EngineError::NotFound(_)));
    }

    #[test]
    fn store_validation_maps_through() {
        let e: EngineError = StoreError::Validation("bad".into()).into();
        assert!(matches!(e, EngineError::Validation(_)));
    }

    #[test]
    fn provider_canceled_maps_to_engine_canceled() {
        let e: EngineError = ProviderError::Canceled.into();
        assert!(matches!(e, EngineError::Canceled));
    }

    #[test]
    fn provider_auth_failure_stays_a_provider_error() {
        let e: EngineError = ProviderError::AuthFailed("bad key".into()).into();
        assert!(matches!(e, EngineError::Provider(ProviderError::AuthFailed(_))));
    }
}
