// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared driver for OpenAI-compatible chat completion APIs.
//!
//! Most hosted providers and all common local servers speak the same
//! `/chat/completions` wire format.  This module provides a single
//! `OpenAICompatAdapter` that every such driver configures with its own
//! defaults (URL, auth style, headers).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    normalize_finish, ChatRequest, ChatResponse, ProviderError, ReplyMessage, TokenUsage,
    WireToolCall,
};

/// How to send the API key in HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` — standard for most providers.
    Bearer,
    /// No authentication header — local servers (Ollama, vLLM, LM Studio).
    None,
}

/// OpenAI-compatible chat completion adapter.
pub struct OpenAICompatAdapter {
    driver_name: &'static str,
    /// Full chat completions URL, e.g. `https://api.groq.com/openai/v1/chat/completions`.
    chat_url: String,
    api_key: Option<String>,
    auth_style: AuthStyle,
    extra_headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl OpenAICompatAdapter {
    pub fn new(
        driver_name: &'static str,
        base_url: &str,
        api_key: Option<String>,
        auth_style: AuthStyle,
        extra_headers: Vec<(String, String)>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            driver_name,
            chat_url: format!("{base}/chat/completions"),
            api_key,
            auth_style,
            extra_headers,
            client: reqwest::Client::new(),
        }
    }
}

/// Serialize the canonical request into an OpenAI-dialect body.
pub(crate) fn build_body(req: &ChatRequest) -> Value {
    let mut body = json!({
        "model": req.model,
        "messages": req.messages,
    });
    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }
    if let Some(t) = req.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(m) = req.max_tokens {
        body["max_tokens"] = json!(m);
    }
    if let Some(effort) = &req.reasoning_effort {
        body["reasoning_effort"] = json!(effort);
    }
    body
}

/// Parse an OpenAI-dialect response body into the normalized form.
pub(crate) fn parse_response(v: &Value) -> Result<ChatResponse, ProviderError> {
    let choice = v["choices"]
        .get(0)
        .ok_or_else(|| ProviderError::Transient("response has no choices".into()))?;
    let msg = &choice["message"];

    let content = msg["content"].as_str().unwrap_or_default().to_string();
    let mut tool_calls = Vec::new();
    if let Some(calls) = msg["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
            if name.is_empty() {
                // A call without a name cannot be dispatched; keeping it would
                // corrupt the transcript sent back on the next turn.
                continue;
            }
            let arguments = match &call["function"]["arguments"] {
                Value::String(s) => s.clone(),
                Value::Null => "{}".to_string(),
                other => other.to_string(),
            };
            tool_calls.push(WireToolCall::function(id, name, arguments));
        }
    }

    let finish = normalize_finish(choice["finish_reason"].as_str(), !tool_calls.is_empty());
    let usage = parse_usage(&v["usage"]);

    Ok(ChatResponse {
        message: ReplyMessage { content, tool_calls },
        usage,
        finish_reason: finish,
    })
}

fn parse_usage(v: &Value) -> TokenUsage {
    let prompt = v["prompt_tokens"].as_u64().unwrap_or(0) as u32;
    let completion = v["completion_tokens"].as_u64().unwrap_or(0) as u32;
    let total = v["total_tokens"].as_u64().unwrap_or((prompt + completion) as u64) as u32;
    TokenUsage { prompt_tokens: prompt, completion_tokens: completion, total_tokens: total }
}

/// Read a `Retry-After` header (seconds form only).
pub(crate) fn retry_after_hint(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl crate::ProviderAdapter for OpenAICompatAdapter {
    fn provider_type(&self) -> &str {
        self.driver_name
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_body(&req);
        debug!(driver = self.driver_name, model = %req.model, url = %self.chat_url, "chat completion request");

        let mut http = self.client.post(&self.chat_url).json(&body);
        if let (AuthStyle::Bearer, Some(key)) = (&self.auth_style, &self.api_key) {
            http = http.bearer_auth(key);
        }
        for (name, val) in &self.extra_headers {
            http = http.header(name.as_str(), val.as_str());
        }

        let resp = http.send().await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, ToolSchema, WireMessage};

    fn request_with_tool() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![WireMessage::system("be terse"), WireMessage::user("hi")],
            tools: vec![ToolSchema {
                name: "echo".into(),
                description: "echoes".into(),
                parameters: json!({ "type": "object", "properties": { "x": { "type": "string" } } }),
            }],
            temperature: Some(0.2),
            max_tokens: Some(256),
            reasoning_effort: None,
        }
    }

    // ── Request body ──────────────────────────────────────────────────────────

    #[test]
    fn body_carries_model_messages_and_sampling() {
        let body = build_body(&request_with_tool());
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["temperature"], json!(0.2));
        assert_eq!(body["max_tokens"], json!(256));
    }

    #[test]
    fn body_wraps_tools_in_function_envelope() {
        let body = build_body(&request_with_tool());
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "echo");
        assert!(tools[0]["function"]["parameters"].is_object());
    }

    #[test]
    fn body_omits_optional_fields() {
        let req = ChatRequest { model: "m".into(), messages: vec![], ..Default::default() };
        let body = build_body(&req);
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn body_includes_reasoning_effort_when_set() {
        let mut req = request_with_tool();
        req.reasoning_effort = Some("high".into());
        assert_eq!(build_body(&req)["reasoning_effort"], "high");
    }

    // ── Response parsing ──────────────────────────────────────────────────────

    #[test]
    fn parses_plain_text_response() {
        let v = json!({
            "choices": [{ "finish_reason": "stop",
                          "message": { "role": "assistant", "content": "pong" } }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4 }
        });
        let r = parse_response(&v).unwrap();
        assert_eq!(r.message.content, "pong");
        assert!(r.message.tool_calls.is_empty());
        assert_eq!(r.finish_reason, FinishReason::Stop);
        assert_eq!(r.usage, TokenUsage { prompt_tokens: 3, completion_tokens: 1, total_tokens: 4 });
    }

    #[test]
    fn parses_tool_call_response() {
        let v = json!({
            "choices": [{ "finish_reason": "tool_calls",
                          "message": { "role": "assistant", "content": null,
                                       "tool_calls": [{ "id": "c1", "type": "function",
                                                        "function": { "name": "echo",
                                                                      "arguments": "{\"x\":\"hi\"}" } }] } }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7 }
        });
        let r = parse_response(&v).unwrap();
        assert_eq!(r.finish_reason, FinishReason::ToolCalls);
        assert_eq!(r.message.tool_calls.len(), 1);
        assert_eq!(r.message.tool_calls[0].function.name, "echo");
        assert_eq!(r.message.tool_calls[0].function.arguments, "{\"x\":\"hi\"}");
    }

    #[test]
    fn drops_tool_calls_with_empty_name() {
        let v = json!({
            "choices": [{ "finish_reason": "tool_calls",
                          "message": { "content": "", "tool_calls": [
                              { "id": "c1", "type": "function", "function": { "name": "", "arguments": "{}" } }
                          ] } }]
        });
        let r = parse_response(&v).unwrap();
        assert!(r.message.tool_calls.is_empty());
        // With every call dropped the turn degrades to a plain stop.
        assert_eq!(r.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn missing_usage_zero_fills() {
        let v = json!({
            "choices": [{ "finish_reason": "stop", "message": { "content": "ok" } }]
        });
        let r = parse_response(&v).unwrap();
        assert_eq!(r.usage, TokenUsage::default());
    }

    #[test]
    fn empty_choices_is_transient() {
        let v = json!({ "choices": [] });
        assert!(matches!(parse_response(&v), Err(ProviderError::Transient(_))));
    }

    #[test]
    fn non_string_arguments_are_reserialized() {
        // Some local servers return the arguments object inline rather than
        // as a JSON-encoded string.
        let v = json!({
            "choices": [{ "finish_reason": "tool_calls",
                          "message": { "content": "", "tool_calls": [
                              { "id": "c1", "type": "function",
                                "function": { "name": "echo", "arguments": { "x": 1 } } }
                          ] } }]
        });
        let r = parse_response(&v).unwrap();
        assert_eq!(r.message.tool_calls[0].function.arguments, "{\"x\":1}");
    }
}
