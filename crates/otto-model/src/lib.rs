// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod registry;
mod adapter;
mod anthropic;
mod error;
mod google;
mod mock;
pub(crate) mod openai_compat;
mod types;

pub use adapter::ProviderAdapter;
pub use anthropic::AnthropicAdapter;
pub use error::ProviderError;
pub use google::GoogleAdapter;
pub use mock::{ScriptedAdapter, ScriptedCall};
pub use openai_compat::{AuthStyle, OpenAICompatAdapter};
pub use registry::{get_driver, known_driver_ids, list_drivers, Dialect, DriverMeta};
pub use types::*;

use std::sync::Arc;

/// Transport configuration for one adapter instance.
///
/// The model, transcript and sampling parameters travel in every
/// [`ChatRequest`]; this struct only carries what is fixed per endpoint so
/// adapters (and their pooled HTTP clients) can be cached and shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AdapterConfig {
    /// Provider id.  Run `otto list-providers` for the full list.
    pub provider_type: String,
    /// Base URL override; drivers have sensible defaults for hosted APIs.
    pub base_url: Option<String>,
    /// Literal key or a `#{VAR}#` indirection resolved from the environment.
    pub api_key: Option<String>,
}

/// Resolve an API key reference.
///
/// `#{NAME}#` is an indirection looked up in the environment; anything else
/// passes through verbatim.  An indirection naming an unset variable
/// resolves to `None` so auth failures surface at request time with a clear
/// provider error rather than a confusing literal key.
pub fn resolve_api_key(reference: &str) -> Option<String> {
    let name = reference.strip_prefix("#{").and_then(|rest| rest.strip_suffix("}#"));
    match name {
        Some(var) => std::env::var(var).ok(),
        None => Some(reference.to_string()),
    }
}

/// Construct a shared [`ProviderAdapter`] from configuration.
///
/// Selects the driver implementation based on `cfg.provider_type` and fills
/// in registry defaults for the base URL and API-key environment variable.
pub fn from_config(cfg: &AdapterConfig) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let meta = get_driver(&cfg.provider_type).ok_or_else(|| {
        let known: Vec<&str> = known_driver_ids().collect();
        ProviderError::InvalidRequest(format!(
            "unknown provider type {:?}; known providers: {}",
            cfg.provider_type,
            known.join(", ")
        ))
    })?;

    let base_url = cfg
        .base_url
        .clone()
        .or_else(|| meta.default_base_url.map(str::to_string))
        .ok_or_else(|| {
            ProviderError::InvalidRequest(format!(
                "provider {:?} requires an explicit base_url",
                meta.id
            ))
        })?;

    let api_key = cfg
        .api_key
        .as_deref()
        .and_then(resolve_api_key)
        .or_else(|| meta.default_api_key_env.and_then(|var| std::env::var(var).ok()));

    let adapter: Arc<dyn ProviderAdapter> = match meta.dialect {
        Dialect::Anthropic => Arc::new(AnthropicAdapter::new(&base_url, api_key)),
        Dialect::Google => Arc::new(GoogleAdapter::new(&base_url, api_key)),
        Dialect::OpenAi => {
            let auth = if api_key.is_some() { AuthStyle::Bearer } else { AuthStyle::None };
            Arc::new(OpenAICompatAdapter::new(meta.id, &base_url, api_key, auth, vec![]))
        }
    };
    Ok(adapter)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
