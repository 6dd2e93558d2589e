// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Reasoning effort requested from reasoning-capable models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    /// Wire value for providers that accept an effort parameter;
    /// `None` means the parameter is omitted entirely.
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Low => Some("low"),
            Self::Medium => Some("medium"),
            Self::High => Some("high"),
        }
    }
}

/// A named agent: system prompt, model binding and tool set.
///
/// Read-only for the engine — a resolved agent is treated as a value
/// snapshot for the duration of one turn.  Ids are opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    pub model: String,
    pub provider_type: String,
    /// Endpoint override; takes precedence over the provider catalog entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Literal key or a `#{VAR}#` indirection resolved from the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    /// Names of tools this agent may call.
    #[serde(default)]
    pub tools: Vec<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
