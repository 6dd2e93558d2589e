// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Message roles in the canonical (OpenAI-dialect) wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One transcript entry in the canonical wire form.  Built by the engine
/// from the persisted transcript; adapters translate it to their dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: WireRole::System, content: content.into(), tool_call_id: None, tool_calls: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: WireRole::User, content: content.into(), tool_call_id: None, tool_calls: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: WireRole::Assistant, content: content.into(), tool_call_id: None, tool_calls: None }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<WireToolCall>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunction,
}

impl WireToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".into(),
            function: WireFunction { name: name.into(), arguments: arguments.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// A tool schema offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Canonical request built by the engine; adapters translate this to the
/// provider's own dialect.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// "low" | "medium" | "high"; omitted when `None`.
    pub reasoning_effort: Option<String>,
}

/// Provider-normalized termination cause of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Error,
}

/// Normalize a provider's finish-reason string.
///
/// Unknown values fall back on the message shape: a reply that carries tool
/// calls is a tool-call turn regardless of what the provider labelled it.
pub fn normalize_finish(raw: Option<&str>, has_tool_calls: bool) -> FinishReason {
    match raw {
        Some("stop") | Some("end_turn") | Some("stop_sequence") | Some("STOP") => {
            if has_tool_calls {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            }
        }
        Some("tool_calls") | Some("function_call") | Some("tool_use") => FinishReason::ToolCalls,
        Some("length") | Some("max_tokens") | Some("MAX_TOKENS") => FinishReason::Length,
        Some("content_filter") | Some("refusal") | Some("SAFETY") | Some("RECITATION") => {
            FinishReason::ContentFilter
        }
        Some(_) | None => {
            if has_tool_calls {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            }
        }
    }
}

/// Token usage reported by the provider; zero-filled when omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }
    }
}

/// The assistant reply carried by a [`ChatResponse`].
#[derive(Debug, Clone, Default)]
pub struct ReplyMessage {
    pub content: String,
    pub tool_calls: Vec<WireToolCall>,
}

/// Normalized response of one provider call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: ReplyMessage,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
