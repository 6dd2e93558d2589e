// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The chat orchestration loop.
//!
//! One call to [`Orchestrator::run_turn`] drives a whole turn: persist the
//! user message, then call the provider and dispatch tool calls until the
//! model produces a terminal assistant message, the step cap fires, an
//! unrecoverable provider error surfaces, or the turn is canceled.  Every
//! append is committed before the loop moves on — cancellation never rolls
//! back work, it only stops more work from starting.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{ChatLog, EngineError, RetryPolicy};
use otto_model::{
    AdapterConfig, ChatRequest, ChatResponse, FinishReason, ProviderAdapter, ProviderError,
    ToolSchema, WireMessage, WireToolCall,
};
use otto_store::{
    Agent, AgentRepository, Message, ProviderEntry, ProviderRepository, Role, ToolCall,
    ToolCallEvent,
};
use otto_tools::{ToolOutput, ToolRegistry};

/// Content of the synthetic assistant message appended when a turn hits the
/// step cap.
pub const STEP_LIMIT_NOTICE: &str = "step limit reached";

/// Stand-in content for tool calls a canceled turn never answered; sent to
/// the provider so the wire transcript stays well-formed, never persisted.
const ABANDONED_RESULT: &str = "[canceled]";

/// Limits and policies of one turn.
#[derive(Debug, Clone)]
pub struct TurnLimits {
    /// Maximum assistant turns per user message.
    pub max_steps: u32,
    /// Per-attempt provider HTTP timeout.
    pub provider_timeout: Duration,
    /// Outer deadline for the whole turn.
    pub turn_timeout: Duration,
    /// Per-tool-invocation timeout.  Long by default so shell tools running
    /// builds are not cut off.
    pub tool_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_steps: 25,
            provider_timeout: Duration::from_secs(120),
            turn_timeout: Duration::from_secs(3600),
            tool_timeout: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
        }
    }
}

/// Resolves the provider adapter for an agent.  The engine resolves one
/// snapshot per turn; implementations cache adapters so pooled HTTP clients
/// are shared across turns.
pub trait AdapterFactory: Send + Sync {
    fn adapter_for(
        &self,
        agent: &Agent,
        provider: Option<&ProviderEntry>,
    ) -> Result<Arc<dyn ProviderAdapter>, EngineError>;
}

/// Production factory: builds adapters from the driver registry, keyed by
/// transport configuration.
#[derive(Default)]
pub struct ConfigAdapterFactory {
    cache: StdMutex<HashMap<AdapterConfig, Arc<dyn ProviderAdapter>>>,
}

impl ConfigAdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdapterFactory for ConfigAdapterFactory {
    fn adapter_for(
        &self,
        agent: &Agent,
        provider: Option<&ProviderEntry>,
    ) -> Result<Arc<dyn ProviderAdapter>, EngineError> {
        let cfg = AdapterConfig {
            provider_type: agent.provider_type.clone(),
            base_url: agent
                .endpoint
                .clone()
                .or_else(|| provider.and_then(|p| p.base_url.clone())),
            api_key: agent.api_key.clone().or_else(|| {
                provider
                    .and_then(|p| p.api_key_env.as_deref())
                    .map(|var| format!("#{{{var}}}#"))
            }),
        };
        let mut cache = self.cache.lock().expect("adapter cache poisoned");
        if let Some(adapter) = cache.get(&cfg) {
            return Ok(Arc::clone(adapter));
        }
        let adapter = otto_model::from_config(&cfg).map_err(EngineError::from)?;
        cache.insert(cfg, Arc::clone(&adapter));
        Ok(adapter)
    }
}

/// Test factory: always hands out the same adapter.
pub struct FixedAdapterFactory(pub Arc<dyn ProviderAdapter>);

impl AdapterFactory for FixedAdapterFactory {
    fn adapter_for(
        &self,
        _agent: &Agent,
        _provider: Option<&ProviderEntry>,
    ) -> Result<Arc<dyn ProviderAdapter>, EngineError> {
        Ok(Arc::clone(&self.0))
    }
}

pub struct Orchestrator {
    log: Arc<ChatLog>,
    agents: Arc<dyn AgentRepository>,
    providers: Arc<dyn ProviderRepository>,
    tools: Arc<ToolRegistry>,
    adapters: Arc<dyn AdapterFactory>,
    limits: TurnLimits,
}

impl Orchestrator {
    pub fn new(
        log: Arc<ChatLog>,
        agents: Arc<dyn AgentRepository>,
        providers: Arc<dyn ProviderRepository>,
        tools: Arc<ToolRegistry>,
        adapters: Arc<dyn AdapterFactory>,
        limits: TurnLimits,
    ) -> Self {
        Self { log, agents, providers, tools, adapters, limits }
    }

    /// Run one turn.  On success, returns the terminal assistant message.
    /// On `Canceled`, everything committed before the cancellation remains
    /// persisted; callers re-read the chat (with a fresh context) to obtain
    /// partial results.
    pub async fn run_turn(
        &self,
        chat_id: &str,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<Message, EngineError> {
        if user_text.trim().is_empty() {
            return Err(EngineError::Validation("message must not be empty".into()));
        }
        let deadline = Instant::now() + self.limits.turn_timeout;
        let turn = cancel.child_token();

        // S0: persist the user message.
        self.log.append_message(chat_id, Message::user(user_text)).await?;
        let mut appended_since_user = 0usize;
        let mut steps = 0u32;

        loop {
            if turn.is_cancelled() || Instant::now() >= deadline {
                return self.finish_canceled(chat_id, appended_since_user);
            }

            // S1: resolve the agent snapshot and call the provider.
            let chat = self.log.read_chat(chat_id).await?;
            let agent = self.agents.get(&chat.agent_id).await?;
            let model = chat.model_id.clone().unwrap_or_else(|| agent.model.clone());
            let provider_entry = self.providers.get(&agent.provider_type);
            let adapter = self.adapters.adapter_for(&agent, provider_entry.as_ref())?;
            let request = build_request(&agent, &model, &chat.messages, &self.tools);

            let response = match self.call_provider(&*adapter, request, &turn, deadline).await {
                Ok(r) => r,
                Err(EngineError::Canceled) => {
                    return self.finish_canceled(chat_id, appended_since_user)
                }
                // S6: the partial transcript stays persisted.
                Err(e) => return Err(e),
            };

            let usage = self.log.price_usage(&agent.provider_type, &model, &response.usage);
            let tool_calls = response.message.tool_calls.clone();

            if response.finish_reason == FinishReason::ToolCalls && !tool_calls.is_empty() {
                let declared: Vec<ToolCall> = tool_calls
                    .iter()
                    .map(|tc| ToolCall::function(&tc.id, &tc.function.name, &tc.function.arguments))
                    .collect();
                let assistant = Message::assistant_with_tool_calls(
                    response.message.content.clone(),
                    declared,
                )
                .with_usage(usage.clone());
                self.log.append_message(chat_id, assistant).await?;
                appended_since_user += 1;
                self.log.update_usage(chat_id, &usage).await?;

                // S2: dispatch the calls concurrently.
                let canceled_mid = self
                    .dispatch_tools(chat_id, &agent, &tool_calls, &turn, &mut appended_since_user)
                    .await?;
                if canceled_mid || Instant::now() >= deadline {
                    return self.finish_canceled(chat_id, appended_since_user);
                }

                // S3: bound the loop.
                steps += 1;
                if steps >= self.limits.max_steps {
                    debug!(chat_id, steps, "step cap reached; closing turn");
                    let wrap = self
                        .log
                        .append_message(chat_id, Message::assistant(STEP_LIMIT_NOTICE))
                        .await?;
                    return Ok(wrap);
                }
                continue;
            }

            // S5: terminal assistant message.
            let assistant =
                Message::assistant(response.message.content.clone()).with_usage(usage.clone());
            let message = self.log.append_message(chat_id, assistant).await?;
            self.log.update_usage(chat_id, &usage).await?;
            return Ok(message);
        }
    }

    /// S1 with the S4 retry policy folded in.  Returns `Canceled` when the
    /// caller's scope fires or the outer deadline passes; retries transient
    /// and rate-limited failures with backoff until attempts are exhausted.
    async fn call_provider(
        &self,
        adapter: &dyn ProviderAdapter,
        request: ChatRequest,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<ChatResponse, EngineError> {
        let mut attempt = 1u32;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Canceled),
                _ = tokio::time::sleep_until(deadline) => return Err(EngineError::Canceled),
                r = tokio::time::timeout(self.limits.provider_timeout, adapter.invoke(request.clone())) => r,
            };

            let error = match outcome {
                Ok(Ok(response)) => {
                    if response.finish_reason == FinishReason::Error {
                        // The provider answered but flagged the completion
                        // itself as failed; treat like any transient fault.
                        ProviderError::Transient("provider reported an error finish".into())
                    } else {
                        return Ok(response);
                    }
                }
                Ok(Err(ProviderError::Canceled)) => return Err(EngineError::Canceled),
                Ok(Err(e)) => e,
                Err(_elapsed) => ProviderError::Transient(format!(
                    "provider attempt timed out after {}s",
                    self.limits.provider_timeout.as_secs()
                )),
            };

            if !error.is_retryable() || attempt >= self.limits.retry.max_attempts {
                warn!(attempt, error = %error, "provider call failed; giving up");
                return Err(EngineError::from(error));
            }

            let hint = match &error {
                ProviderError::RateLimited { retry_after, .. } => *retry_after,
                _ => None,
            };
            let delay = self.limits.retry.delay(attempt, hint);
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error,
                  "provider call failed; backing off");
            attempt += 1;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Canceled),
                _ = tokio::time::sleep_until(deadline) => return Err(EngineError::Canceled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// S2: run every tool call of the last assistant message concurrently
    /// under a child of the turn's cancellation scope.  Results are
    /// appended in *completion* order, each with its event constructed once
    /// — embedded in the tool message and broadcast by the log.
    ///
    /// Returns `true` when the turn was canceled mid-dispatch; whatever
    /// results arrived (including canceled-error outputs) are appended.
    async fn dispatch_tools(
        &self,
        chat_id: &str,
        agent: &Agent,
        calls: &[WireToolCall],
        cancel: &CancellationToken,
        appended_since_user: &mut usize,
    ) -> Result<bool, EngineError> {
        let mut tasks: JoinSet<(usize, ToolOutput)> = JoinSet::new();
        let mut task_index: HashMap<tokio::task::Id, usize> = HashMap::new();

        for (i, tc) in calls.iter().enumerate() {
            let registry = Arc::clone(&self.tools);
            let child = cancel.child_token();
            let call_id = tc.id.clone();
            let name = tc.function.name.clone();
            let args = tc.function.arguments.clone();
            let timeout = self.limits.tool_timeout;
            let allowed = agent.tools.iter().any(|n| n == &name);

            let handle = tasks.spawn(async move {
                let output = if allowed {
                    registry.execute_json(&call_id, &name, &args, &child, timeout).await
                } else {
                    ToolOutput::err(&call_id, format!("tool {name} is not available to this agent"))
                };
                (i, output)
            });
            task_index.insert(handle.id(), i);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (i, output) = match joined {
                Ok((_task_id, (i, output))) => (i, output),
                Err(join_err) => {
                    let i = task_index
                        .get(&join_err.id())
                        .copied()
                        .unwrap_or_default();
                    warn!(tool = %calls[i].function.name, error = %join_err, "tool task panicked");
                    (i, ToolOutput::err(&calls[i].id, format!("tool task panicked: {join_err}")))
                }
            };

            let tc = &calls[i];
            let (result, error) = if output.is_error {
                (String::new(), output.content.clone())
            } else {
                (output.content.clone(), String::new())
            };
            let event = ToolCallEvent::new(
                &tc.id,
                &tc.function.name,
                &tc.function.arguments,
                result,
                error,
                output.diff.clone(),
            );
            let tool_msg = Message::tool(&tc.id, output.content, vec![event]);
            self.log.append_tool_result(chat_id, tool_msg).await?;
            *appended_since_user += 1;
        }

        Ok(cancel.is_cancelled())
    }

    /// S7: every append is already committed; emit one terminal refresh when
    /// the canceled turn produced messages beyond the user append, then
    /// surface `Canceled`.
    fn finish_canceled(
        &self,
        chat_id: &str,
        appended_since_user: usize,
    ) -> Result<Message, EngineError> {
        if appended_since_user > 0 {
            self.log.bus().publish_history(chat_id);
        }
        debug!(chat_id, appended_since_user, "turn canceled; partial work persisted");
        Err(EngineError::Canceled)
    }
}

/// Map the persisted transcript into the canonical provider request.
///
/// Two transformations happen here:
/// - only the *most recent* system message is sent (an agent switch
///   supersedes the prior prompt);
/// - tool calls left unanswered by an abandoned (canceled) turn get
///   synthetic `"[canceled]"` results so the wire transcript stays valid.
pub(crate) fn build_request(
    agent: &Agent,
    model: &str,
    messages: &[Message],
    tools: &ToolRegistry,
) -> ChatRequest {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    let system = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.clone());

    let mut wire: Vec<WireMessage> = Vec::with_capacity(messages.len() + 2);
    if let Some(system) = system {
        wire.push(WireMessage::system(system));
    }

    // Tool calls of the assistant message most recently pushed to `wire`
    // that still need a synthetic result before the next non-tool message.
    let mut abandoned: Vec<String> = Vec::new();
    for m in messages {
        if m.role != Role::Tool {
            for id in abandoned.drain(..) {
                wire.push(WireMessage::tool(id, ABANDONED_RESULT));
            }
        }
        match m.role {
            Role::System => {} // handled above
            Role::User => wire.push(WireMessage::user(m.content.clone())),
            Role::Assistant => match &m.tool_calls {
                Some(calls) => {
                    let wire_calls: Vec<WireToolCall> = calls
                        .iter()
                        .map(|c| {
                            WireToolCall::function(&c.id, &c.function.name, &c.function.arguments)
                        })
                        .collect();
                    abandoned = calls
                        .iter()
                        .filter(|c| !answered.contains(c.id.as_str()))
                        .map(|c| c.id.clone())
                        .collect();
                    wire.push(WireMessage::assistant_with_tool_calls(m.content.clone(), wire_calls));
                }
                None => wire.push(WireMessage::assistant(m.content.clone())),
            },
            Role::Tool => {
                wire.push(WireMessage::tool(
                    m.tool_call_id.clone().unwrap_or_default(),
                    m.content.clone(),
                ));
            }
        }
    }
    for id in abandoned.drain(..) {
        wire.push(WireMessage::tool(id, ABANDONED_RESULT));
    }

    let tool_schemas: Vec<ToolSchema> = tools
        .schemas_for(&agent.tools)
        .into_iter()
        .map(|s| ToolSchema { name: s.name, description: s.description, parameters: s.parameters })
        .collect();

    ChatRequest {
        model: model.to_string(),
        messages: wire,
        tools: tool_schemas,
        temperature: agent.temperature,
        max_tokens: agent.max_tokens,
        reasoning_effort: agent.reasoning_effort.as_wire().map(str::to_string),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
