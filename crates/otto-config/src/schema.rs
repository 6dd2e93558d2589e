// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Provider catalog keyed by provider type.  Drives endpoint lookup and
    /// per-model pricing for usage accounting.
    ///
    /// ```yaml
    /// providers:
    ///   openai:
    ///     api_key_env: OPENAI_API_KEY
    ///     models:
    ///       - name: gpt-4o
    ///         input_price_per_mille: 0.0025
    ///         output_price_per_mille: 0.01
    ///         context_window: 128000
    /// ```
    #[serde(default)]
    pub providers: HashMap<String, ProviderDef>,
    /// Named agents selectable with `otto chat --agent <name>`.
    #[serde(default)]
    pub agents: Vec<AgentDef>,
    /// Directory for persisted chats (one JSON document per chat).
    /// When unset, chats live in memory for the lifetime of the process.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Engine limits.  All defaults match the orchestration loop's own defaults;
/// config only needs to mention the fields it wants to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum assistant turns per user message before the loop wraps up.
    pub max_steps: u32,
    /// Per-attempt provider HTTP timeout, seconds.
    pub provider_timeout_secs: u64,
    /// Outer deadline for a whole turn, seconds.
    pub turn_timeout_secs: u64,
    /// Per-tool-invocation timeout, seconds.  Long by default so shell tools
    /// running builds or test suites are not cut off.
    pub tool_timeout_secs: u64,
    /// Bounded buffer size for each event-bus subscriber.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            provider_timeout_secs: 120,
            turn_timeout_secs: 3600,
            tool_timeout_secs: 3600,
            event_buffer: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderDef {
    /// Base URL override.  Most hosted providers have a correct default
    /// built into the driver registry; local servers and proxies set this.
    pub base_url: Option<String>,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelDef>,
}

/// Pricing and limits for one model of a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    /// USD per 1000 prompt tokens.
    #[serde(default)]
    pub input_price_per_mille: f64,
    /// USD per 1000 completion tokens.
    #[serde(default)]
    pub output_price_per_mille: f64,
    #[serde(default)]
    pub context_window: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    /// Stable id.  Defaults to the agent name when omitted; the engine treats
    /// ids as opaque strings either way.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Model name forwarded to the provider API.
    pub model: String,
    /// Provider type.  Run `otto list-providers` for the full list.
    pub provider: String,
    /// Endpoint override for this agent (takes precedence over the provider
    /// catalog's base_url).
    pub endpoint: Option<String>,
    /// API key or a `#{VAR}#` indirection resolved from the environment.
    /// Prefer the indirection form in version-controlled files.
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub context_window: Option<u32>,
    /// "none" | "low" | "medium" | "high"
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    /// Names of tools this agent may call.
    #[serde(default)]
    pub tools: Vec<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_match_loop_defaults() {
        let e = EngineConfig::default();
        assert_eq!(e.max_steps, 25);
        assert_eq!(e.provider_timeout_secs, 120);
        assert_eq!(e.turn_timeout_secs, 3600);
        assert_eq!(e.event_buffer, 50);
    }

    #[test]
    fn agent_def_parses_minimal_yaml() {
        let yaml = r#"
name: terse
model: gpt-4o
provider: openai
"#;
        let a: AgentDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(a.name, "terse");
        assert!(a.id.is_none());
        assert!(a.tools.is_empty());
        assert!(a.reasoning_effort.is_none());
    }

    #[test]
    fn provider_def_parses_models_with_pricing() {
        let yaml = r#"
api_key_env: OPENAI_API_KEY
models:
  - name: gpt-4o
    input_price_per_mille: 0.0025
    output_price_per_mille: 0.01
    context_window: 128000
"#;
        let p: ProviderDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.models.len(), 1);
        assert_eq!(p.models[0].input_price_per_mille, 0.0025);
    }

    #[test]
    fn full_config_round_trips() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.engine.max_steps, cfg.engine.max_steps);
    }
}
