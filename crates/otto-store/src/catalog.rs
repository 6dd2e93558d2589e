// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Provider catalog: endpoint lookup and per-model pricing.

use serde::{Deserialize, Serialize};

/// Pricing and limits for a single model of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
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

impl ModelEntry {
    /// Cost of one provider call in USD.
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        prompt_tokens as f64 * self.input_price_per_mille / 1000.0
            + completion_tokens as f64 * self.output_price_per_mille / 1000.0
    }
}

/// One provider in the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl ProviderEntry {
    pub fn model(&self, name: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.name == name)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
