// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    ChatRequest, ChatResponse, FinishReason, ProviderError, ReplyMessage, TokenUsage, WireToolCall,
};

/// One scripted provider call: an optional artificial latency followed by a
/// canned outcome.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub delay: Option<Duration>,
    pub result: Result<ChatResponse, ProviderError>,
}

impl ScriptedCall {
    /// A plain text reply with the given token usage.
    pub fn text(content: impl Into<String>, prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            delay: None,
            result: Ok(ChatResponse {
                message: ReplyMessage { content: content.into(), tool_calls: vec![] },
                usage: TokenUsage::new(prompt_tokens, completion_tokens),
                finish_reason: FinishReason::Stop,
            }),
        }
    }

    /// A tool-call reply.  `calls` is `(id, name, arguments_json)`.
    pub fn tool_calls(
        calls: Vec<(&str, &str, &str)>,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Self {
        Self {
            delay: None,
            result: Ok(ChatResponse {
                message: ReplyMessage {
                    content: String::new(),
                    tool_calls: calls
                        .into_iter()
                        .map(|(id, name, args)| WireToolCall::function(id, name, args))
                        .collect(),
                },
                usage: TokenUsage::new(prompt_tokens, completion_tokens),
                finish_reason: FinishReason::ToolCalls,
            }),
        }
    }

    /// A failed call.
    pub fn error(e: ProviderError) -> Self {
        Self { delay: None, result: Err(e) }
    }

    /// Add artificial latency before the outcome is produced.  The sleep is
    /// cancellable: dropping the invoke future aborts it, which is exactly
    /// how real HTTP calls behave under `select!`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A pre-scripted provider adapter.  Each `invoke` pops the next scripted
/// call from the front of the queue, so tests specify exact call sequences
/// without network access.  Every received request is recorded for
/// inspection.
pub struct ScriptedAdapter {
    scripts: Mutex<VecDeque<ScriptedCall>>,
    /// When set, `invoke` keeps replaying this call after the queue drains.
    repeat: Option<ScriptedCall>,
    /// Every request seen, in order.
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedAdapter {
    pub fn new(calls: Vec<ScriptedCall>) -> Self {
        Self {
            scripts: Mutex::new(calls.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// An adapter that replays `call` forever.  Used for step-cap tests
    /// where the model never stops asking for tools.
    pub fn repeating(call: ScriptedCall) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            repeat: Some(call),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of `invoke` calls received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock poisoned").len()
    }

    /// The last request seen, if any.
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().expect("requests lock poisoned").last().cloned()
    }
}

#[async_trait]
impl crate::ProviderAdapter for ScriptedAdapter {
    fn provider_type(&self) -> &str {
        "scripted-mock"
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().expect("requests lock poisoned").push(req);
        let call = {
            let mut scripts = self.scripts.lock().expect("scripts lock poisoned");
            scripts.pop_front().or_else(|| self.repeat.clone())
        };
        let call = call.unwrap_or_else(|| ScriptedCall::text("[script exhausted]", 0, 0));
        if let Some(delay) = call.delay {
            tokio::time::sleep(delay).await;
        }
        call.result
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderAdapter, WireMessage};

    fn req() -> ChatRequest {
        ChatRequest {
            model: "mock".into(),
            messages: vec![WireMessage::user("hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pops_scripts_in_order() {
        let p = ScriptedAdapter::new(vec![
            ScriptedCall::text("first", 1, 1),
            ScriptedCall::text("second", 1, 1),
        ]);
        assert_eq!(p.invoke(req()).await.unwrap().message.content, "first");
        assert_eq!(p.invoke(req()).await.unwrap().message.content, "second");
        assert_eq!(p.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_scripts_fall_back_to_marker() {
        let p = ScriptedAdapter::new(vec![]);
        let r = p.invoke(req()).await.unwrap();
        assert!(r.message.content.contains("script exhausted"));
    }

    #[tokio::test]
    async fn repeating_adapter_never_drains() {
        let p = ScriptedAdapter::repeating(ScriptedCall::tool_calls(vec![("c1", "echo", "{}")], 1, 1));
        for _ in 0..5 {
            let r = p.invoke(req()).await.unwrap();
            assert_eq!(r.finish_reason, FinishReason::ToolCalls);
        }
    }

    #[tokio::test]
    async fn records_requests_for_inspection() {
        let p = ScriptedAdapter::new(vec![ScriptedCall::text("ok", 1, 1)]);
        p.invoke(req()).await.unwrap();
        let last = p.last_request().unwrap();
        assert_eq!(last.messages.len(), 1);
    }

    #[tokio::test]
    async fn scripted_error_is_returned() {
        let p = ScriptedAdapter::new(vec![ScriptedCall::error(ProviderError::AuthFailed("bad key".into()))]);
        assert!(matches!(p.invoke(req()).await, Err(ProviderError::AuthFailed(_))));
    }
}
