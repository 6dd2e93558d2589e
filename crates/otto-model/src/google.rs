// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Native driver for the Google Generative Language API (`generateContent`).
//!
//! Gemini has no opaque tool-call ids: `functionResponse` parts are matched
//! to `functionCall` parts by function *name*.  The adapter therefore keeps
//! a map from the engine's tool_call_id to the function name when
//! serializing history, and mints synthetic ids when parsing responses.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::openai_compat::retry_after_hint;
use crate::{
    normalize_finish, ChatRequest, ChatResponse, ProviderError, ReplyMessage, TokenUsage,
    WireRole, WireToolCall,
};

pub struct GoogleAdapter {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GoogleAdapter {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

pub(crate) fn build_body(req: &ChatRequest) -> Value {
    // First pass: map tool_call_id → function name so functionResponse parts
    // can carry the name Gemini matches on.
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    for m in &req.messages {
        for tc in m.tool_calls.as_deref().unwrap_or_default() {
            call_names.insert(tc.id.as_str(), tc.function.name.as_str());
        }
    }

    let mut system_text = String::new();
    let mut contents: Vec<Value> = Vec::new();
    for m in &req.messages {
        match m.role {
            WireRole::System => {
                if !system_text.is_empty() {
                    system_text.push_str("\n\n");
                }
                system_text.push_str(&m.content);
            }
            WireRole::User => {
                contents.push(json!({ "role": "user", "parts": [{ "text": m.content }] }));
            }
            WireRole::Assistant => {
                let mut parts: Vec<Value> = Vec::new();
                if !m.content.is_empty() {
                    parts.push(json!({ "text": m.content }));
                }
                for tc in m.tool_calls.as_deref().unwrap_or_default() {
                    let args: Value =
                        serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({}));
                    parts.push(json!({ "functionCall": { "name": tc.function.name, "args": args } }));
                }
                contents.push(json!({ "role": "model", "parts": parts }));
            }
            WireRole::Tool => {
                let call_id = m.tool_call_id.as_deref().unwrap_or_default();
                let name = call_names.get(call_id).copied().unwrap_or(call_id);
                contents.push(json!({
                    "role": "user",
                    "parts": [{ "functionResponse": {
                        "name": name,
                        "response": { "output": m.content }
                    } }]
                }));
            }
        }
    }

    let mut body = json!({ "contents": contents });
    if !system_text.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system_text }] });
    }
    let mut generation: serde_json::Map<String, Value> = serde_json::Map::new();
    if let Some(t) = req.temperature {
        generation.insert("temperature".into(), json!(t));
    }
    if let Some(m) = req.max_tokens {
        generation.insert("maxOutputTokens".into(), json!(m));
    }
    if !generation.is_empty() {
        body["generationConfig"] = Value::Object(generation);
    }
    if !req.tools.is_empty() {
        let declarations: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({ "name": t.name, "description": t.description, "parameters": t.parameters })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }
    body
}

pub(crate) fn parse_response(v: &Value) -> Result<ChatResponse, ProviderError> {
    let candidate = v["candidates"]
        .get(0)
        .ok_or_else(|| ProviderError::Transient("response has no candidates".into()))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for (i, part) in parts.iter().enumerate() {
            if let Some(text) = part["text"].as_str() {
                content.push_str(text);
            }
            if let Some(fc) = part.get("functionCall") {
                let name = fc["name"].as_str().unwrap_or_default().to_string();
                if name.is_empty() {
                    continue;
                }
                // Gemini has no call ids; mint one that stays unique within
                // the assistant message.
                let id = format!("{name}-{i}");
                tool_calls.push(WireToolCall::function(id, name, fc["args"].to_string()));
            }
        }
    }

    let finish = normalize_finish(candidate["finishReason"].as_str(), !tool_calls.is_empty());
    let meta = &v["usageMetadata"];
    let prompt = meta["promptTokenCount"].as_u64().unwrap_or(0) as u32;
    let completion = meta["candidatesTokenCount"].as_u64().unwrap_or(0) as u32;

    Ok(ChatResponse {
        message: ReplyMessage { content, tool_calls },
        usage: TokenUsage::new(prompt, completion),
        finish_reason: finish,
    })
}

#[async_trait]
impl crate::ProviderAdapter for GoogleAdapter {
    fn provider_type(&self) -> &str {
        "google"
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_body(&req);
        debug!(model = %req.model, "google generateContent request");

        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::AuthFailed("no API key configured for google".into()))?;

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, req.model);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
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
