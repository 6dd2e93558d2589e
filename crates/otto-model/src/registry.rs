// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Driver registry: static metadata for every supported provider type.
//!
//! This module is the single source of truth for which provider ids exist
//! and what their defaults are.  Construction logic lives in
//! [`crate::from_config`].

/// Which wire dialect a driver speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `/chat/completions` — OpenAI and the many compatible APIs.
    OpenAi,
    /// Anthropic `/v1/messages`.
    Anthropic,
    /// Google Generative Language `generateContent`.
    Google,
}

/// Metadata describing a registered provider driver.
#[derive(Debug, Clone)]
pub struct DriverMeta {
    /// Unique provider id used in agent/provider config (e.g. `"openai"`).
    pub id: &'static str,
    /// Human-readable display name.
    pub name: &'static str,
    /// One-line description shown by `otto list-providers`.
    pub description: &'static str,
    /// Default environment variable that holds the API key.
    /// `None` for providers that require no key (local servers).
    pub default_api_key_env: Option<&'static str>,
    /// Default base URL when neither the agent nor the provider catalog sets
    /// one.  `None` means the user must supply it (the `generic` driver).
    pub default_base_url: Option<&'static str>,
    pub requires_api_key: bool,
    pub dialect: Dialect,
}

/// Complete registry of supported drivers.
pub static DRIVERS: &[DriverMeta] = &[
    DriverMeta {
        id: "openai",
        name: "OpenAI",
        description: "OpenAI GPT and o-series models",
        default_api_key_env: Some("OPENAI_API_KEY"),
        default_base_url: Some("https://api.openai.com/v1"),
        requires_api_key: true,
        dialect: Dialect::OpenAi,
    },
    DriverMeta {
        id: "anthropic",
        name: "Anthropic",
        description: "Anthropic Claude models",
        default_api_key_env: Some("ANTHROPIC_API_KEY"),
        default_base_url: Some("https://api.anthropic.com"),
        requires_api_key: true,
        dialect: Dialect::Anthropic,
    },
    DriverMeta {
        id: "google",
        name: "Google Gemini",
        description: "Google Gemini models via Generative Language API",
        default_api_key_env: Some("GEMINI_API_KEY"),
        default_base_url: Some("https://generativelanguage.googleapis.com"),
        requires_api_key: true,
        dialect: Dialect::Google,
    },
    DriverMeta {
        id: "xai",
        name: "xAI",
        description: "xAI Grok models",
        default_api_key_env: Some("XAI_API_KEY"),
        default_base_url: Some("https://api.x.ai/v1"),
        requires_api_key: true,
        dialect: Dialect::OpenAi,
    },
    DriverMeta {
        id: "deepseek",
        name: "DeepSeek",
        description: "DeepSeek reasoning and coder models",
        default_api_key_env: Some("DEEPSEEK_API_KEY"),
        default_base_url: Some("https://api.deepseek.com/v1"),
        requires_api_key: true,
        dialect: Dialect::OpenAi,
    },
    DriverMeta {
        id: "together",
        name: "Together AI",
        description: "Together AI open model hosting platform",
        default_api_key_env: Some("TOGETHER_API_KEY"),
        default_base_url: Some("https://api.together.xyz/v1"),
        requires_api_key: true,
        dialect: Dialect::OpenAi,
    },
    DriverMeta {
        id: "groq",
        name: "Groq",
        description: "Groq LPU fast inference",
        default_api_key_env: Some("GROQ_API_KEY"),
        default_base_url: Some("https://api.groq.com/openai/v1"),
        requires_api_key: true,
        dialect: Dialect::OpenAi,
    },
    DriverMeta {
        id: "mistral",
        name: "Mistral AI",
        description: "Mistral AI models including Codestral",
        default_api_key_env: Some("MISTRAL_API_KEY"),
        default_base_url: Some("https://api.mistral.ai/v1"),
        requires_api_key: true,
        dialect: Dialect::OpenAi,
    },
    DriverMeta {
        id: "ollama",
        name: "Ollama",
        description: "Ollama local model runner (http://localhost:11434)",
        default_api_key_env: None,
        default_base_url: Some("http://localhost:11434/v1"),
        requires_api_key: false,
        dialect: Dialect::OpenAi,
    },
    DriverMeta {
        id: "generic",
        name: "Generic OpenAI-compatible",
        description: "Any OpenAI-compatible endpoint (base_url required)",
        default_api_key_env: None,
        default_base_url: None,
        requires_api_key: false,
        dialect: Dialect::OpenAi,
    },
];

/// Returns all registered drivers in declaration order.
pub fn list_drivers() -> &'static [DriverMeta] {
    DRIVERS
}

/// Look up a driver by its id.  Returns `None` for unknown ids.
pub fn get_driver(id: &str) -> Option<&'static DriverMeta> {
    DRIVERS.iter().find(|d| d.id == id)
}

/// Returns an iterator over all known driver ids.
pub fn known_driver_ids() -> impl Iterator<Item = &'static str> {
    DRIVERS.iter().map(|d| d.id)
}
