// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Native driver for the Anthropic Messages API.
//!
//! Differences from the OpenAI dialect that this module bridges:
//! - the system prompt is a top-level field, not a message;
//! - assistant tool calls are `tool_use` content blocks with parsed input;
//! - tool results are `tool_result` blocks inside a *user* message, and all
//!   results of one parallel dispatch must share a single user message
//!   because roles must strictly alternate;
//! - `max_tokens` is mandatory.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::openai_compat::retry_after_hint;
use crate::{
    normalize_finish, ChatRequest, ChatResponse, ProviderError, ReplyMessage, TokenUsage,
    WireRole, WireToolCall,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

/// Translate the canonical request into a Messages API body.
pub(crate) fn build_body(req: &ChatRequest) -> Value {
    let mut system_text = String::new();
    let mut messages: Vec<Value> = Vec::new();

    for m in &req.messages {
        match m.role {
            WireRole::System => {
                if !system_text.is_empty() {
                    system_text.push_str("\n\n");
                }
                system_text.push_str(&m.content);
            }
            WireRole::User => {
                messages.push(json!({ "role": "user",
                                      "content": [{ "type": "text", "text": m.content }] }));
            }
            WireRole::Assistant => {
                let mut blocks: Vec<Value> = Vec::new();
                if !m.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": m.content }));
                }
                for tc in m.tool_calls.as_deref().unwrap_or_default() {
                    let input: Value = serde_json::from_str(&tc.function.arguments)
                        .unwrap_or_else(|_| json!({}));
                    blocks.push(json!({ "type": "tool_use", "id": tc.id,
                                        "name": tc.function.name, "input": input }));
                }
                messages.push(json!({ "role": "assistant", "content": blocks }));
            }
            WireRole::Tool => {
                let block = json!({ "type": "tool_result",
                                    "tool_use_id": m.tool_call_id.as_deref().unwrap_or_default(),
                                    "content": m.content });
                // Merge consecutive tool results into one user message;
                // the API rejects back-to-back user turns.
                let merged = match messages.last_mut() {
                    Some(last)
                        if last["role"] == "user"
                            && last["content"][0]["type"] == "tool_result" =>
                    {
                        match last["content"].as_array_mut() {
                            Some(blocks) => {
                                blocks.push(block.clone());
                                true
                            }
                            None => false,
                        }
                    }
                    _ => false,
                };
                if !merged {
                    messages.push(json!({ "role": "user", "content": [block] }));
                }
            }
        }
    }

    let mut body = json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if !system_text.is_empty() {
        body["system"] = json!(system_text);
    }
    if let Some(t) = req.temperature {
        body["temperature"] = json!(t);
    }
    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({ "name": t.name, "description": t.description,
                        "input_schema": t.parameters })
            })
            .collect();
        body["tools"] = json!(tools);
    }
    body
}

/// Parse a Messages API response into the normalized form.
pub(crate) fn parse_response(v: &Value) -> Result<ChatResponse, ProviderError> {
    let blocks = v["content"]
        .as_array()
        .ok_or_else(|| ProviderError::Transient("response has no content blocks".into()))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => content.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default().to_string();
                let name = block["name"].as_str().unwrap_or_default().to_string();
                if name.is_empty() {
                    continue;
                }
                let arguments = block["input"].to_string();
                tool_calls.push(WireToolCall::function(id, name, arguments));
            }
            _ => {}
        }
    }

    let finish = normalize_finish(v["stop_reason"].as_str(), !tool_calls.is_empty());
    let prompt = v["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
    let completion = v["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;

    Ok(ChatResponse {
        message: ReplyMessage { content, tool_calls },
        usage: TokenUsage::new(prompt, completion),
        finish_reason: finish,
    })
}

#[async_trait]
impl crate::ProviderAdapter for AnthropicAdapter {
    fn provider_type(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_body(&req);
        debug!(model = %req.model, "anthropic messages request");

        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::AuthFailed("no API key configured for anthropic".into()))?;

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let hint = retry_after_hint(resp.headers());
            let detail = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), detail, hint));
        }

        let v: Value = resp.json().await?;
        parse_response(&v)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
