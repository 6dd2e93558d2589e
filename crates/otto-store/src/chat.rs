// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StoreError;

/// Token usage of a single provider call, priced at the moment of the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// USD.  Computed from the provider catalog entry at call time; never
    /// retroactively adjusted when the catalog changes.
    pub cost: f64,
}

/// Cumulative usage of a whole chat.  Invariant: equals the sum of the
/// `usage` fields of the chat's messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost: f64,
}

impl ChatUsage {
    pub fn add(&mut self, delta: &Usage) {
        self.prompt_tokens += delta.prompt_tokens;
        self.completion_tokens += delta.completion_tokens;
        self.total_tokens += delta.total_tokens;
        self.cost += delta.cost;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model inside an assistant message.
/// Ids are unique within one assistant message and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".into(),
            function: FunctionCall { name: name.into(), arguments: arguments.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the provider sent it.
    pub arguments: String,
}

/// Outcome of one tool invocation.  Constructed once, then both embedded in
/// the corresponding tool message and broadcast on the event bus, so live
/// subscribers and replay always see the same data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub result: String,
    /// Empty on success.
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallEvent {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
        result: impl Into<String>,
        error: impl Into<String>,
        diff: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
            result: result.into(),
            error: error.into(),
            diff,
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// A single transcript entry.  `id`, `role` and `timestamp` never mutate
/// after the message has been appended to a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// May be empty, e.g. an assistant message that only carries tool calls.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// For role=tool: the assistant tool call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For role=assistant: tool invocations requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For role=tool: the events captured while executing the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_events: Option<Vec<ToolCallEvent>>,
    /// Set on assistant messages returned by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Message {
    fn base(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_call_id: None,
            tool_calls: None,
            tool_call_events: None,
            usage: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut m = Self::base(Role::Assistant, content);
        m.tool_calls = Some(calls);
        m
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        events: Vec<ToolCallEvent>,
    ) -> Self {
        let mut m = Self::base(Role::Tool, content);
        m.tool_call_id = Some(tool_call_id.into());
        m.tool_call_events = Some(events);
        m
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Tool call ids declared by this message (empty unless role=assistant
    /// with tool calls).
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.tool_calls
            .as_deref()
            .map(|calls| calls.iter().map(|c| c.id.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Aggregate root of a conversation.  Owns its messages; mutated only
/// through grammar-validated appends and the repository `update` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub agent_id: String,
    /// Optional per-chat model override; `None` uses the agent's model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub usage: ChatUsage,
    #[serde(default)]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            model_id: None,
            name: name.into(),
            messages: Vec::new(),
            usage: ChatUsage::default(),
            active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Tool call ids of the most recent assistant message that have not yet
    /// been answered by a tool message.
    pub fn unanswered_tool_calls(&self) -> Vec<&str> {
        let Some(assistant_idx) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant && m.tool_calls.is_some())
        else {
            return Vec::new();
        };
        let declared = self.messages[assistant_idx].tool_call_ids();
        let answered: Vec<&str> = self.messages[assistant_idx + 1..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        declared
            .into_iter()
            .filter(|id| !answered.contains(id))
            .collect()
    }
}

/// Check that appending `new` to `messages` keeps the transcript valid.
///
/// The accepted grammar: an optional leading system message, then user
/// messages alternating with assistant turns.  An assistant turn is an
/// assistant message optionally carrying tool calls, answered by exactly one
/// tool message per call.  A transcript may end mid-turn (a canceled turn
/// persists its partial work); the *next* user message implicitly abandons
/// any still-unanswered calls.
pub fn validate_append(messages: &[Message], new: &Message) -> Result<(), StoreError> {
    let last_role = messages.last().map(|m| m.role);
    match new.role {
        Role::System => {
            // Allowed at the start and as an agent-switch marker between
            // turns; never in the middle of an assistant turn.
            if last_role == Some(Role::Assistant)
                && messages.last().is_some_and(|m| m.tool_calls.is_some())
            {
                return Err(StoreError::Validation(
                    "system message may not interrupt a pending tool dispatch".into(),
                ));
            }
            Ok(())
        }
        Role::User => {
            if last_role == Some(Role::User) {
                return Err(StoreError::Validation(
                    "consecutive user messages are not a valid transcript".into(),
                ));
            }
            Ok(())
        }
        Role::Assistant => {
            match last_role {
                None => Err(StoreError::Validation(
                    "assistant message cannot open a transcript".into(),
                )),
                Some(Role::User) | Some(Role::Tool) => Ok(()),
                Some(Role::System) => Err(StoreError::Validation(
                    "assistant message must follow a user or tool message".into(),
                )),
                Some(Role::Assistant) => Err(StoreError::Validation(
                    "consecutive assistant messages are not a valid transcript".into(),
                )),
            }
        }
        Role::Tool => {
            let Some(call_id) = new.tool_call_id.as_deref() else {
                return Err(StoreError::Validation(
                    "tool message requires a tool_call_id".into(),
                ));
            };
            let Some(assistant_idx) = messages
                .iter()
                .rposition(|m| m.role == Role::Assistant && m.tool_calls.is_some())
            else {
                return Err(StoreError::Validation(format!(
                    "tool message {call_id} has no preceding assistant tool call"
                )));
            };
            let declared = messages[assistant_idx].tool_call_ids();
            if !declared.contains(&call_id) {
                return Err(StoreError::Validation(format!(
                    "tool message references unknown tool_call_id {call_id}"
                )));
            }
            let already_answered = messages[assistant_idx + 1..]
                .iter()
                .any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(call_id));
            if already_answered {
                return Err(StoreError::Validation(format!(
                    "tool_call_id {call_id} already has a tool message"
                )));
            }
            // A user/system message after the assistant closes the turn;
            // late tool results for it are rejected.
            let turn_closed = messages[assistant_idx + 1..]
                .iter()
                .any(|m| matches!(m.role, Role::User | Role::System));
            if turn_closed {
                return Err(StoreError::Validation(format!(
                    "tool_call_id {call_id} belongs to an already closed turn"
                )));
            }
            Ok(())
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant_with_calls(ids: &[&str]) -> Message {
        Message::assistant_with_tool_calls(
            "",
            ids.iter()
                .map(|id| ToolCall::function(*id, "echo", "{}"))
                .collect(),
        )
    }

    // ── Construction ─────────────────────────────────────────────────────────

    #[test]
    fn new_chat_has_unique_id_and_empty_transcript() {
        let a = Chat::new("agent-1", "first");
        let b = Chat::new("agent-1", "second");
        assert_ne!(a.id, b.id);
        assert!(a.messages.is_empty());
        assert_eq!(a.usage, ChatUsage::default());
    }

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        let t = Message::tool("c1", "out", vec![]);
        assert_eq!(t.role, Role::Tool);
        assert_eq!(t.tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn tool_call_event_error_flag() {
        let ok = ToolCallEvent::new("c1", "echo", "{}", "hi", "", None);
        let err = ToolCallEvent::new("c1", "echo", "{}", "", "boom", None);
        assert!(!ok.is_error());
        assert!(err.is_error());
    }

    // ── Usage arithmetic ──────────────────────────────────────────────────────

    #[test]
    fn chat_usage_accumulates() {
        let mut total = ChatUsage::default();
        total.add(&Usage { prompt_tokens: 3, completion_tokens: 1, total_tokens: 4, cost: 0.5 });
        total.add(&Usage { prompt_tokens: 8, completion_tokens: 1, total_tokens: 9, cost: 0.25 });
        assert_eq!(total.prompt_tokens, 11);
        assert_eq!(total.completion_tokens, 2);
        assert_eq!(total.total_tokens, 13);
        assert!((total.cost - 0.75).abs() < 1e-9);
    }

    // ── Role grammar ──────────────────────────────────────────────────────────

    #[test]
    fn system_may_open_transcript() {
        assert!(validate_append(&[], &Message::system("s")).is_ok());
    }

    #[test]
    fn user_may_open_transcript_without_system() {
        assert!(validate_append(&[], &Message::user("hi")).is_ok());
    }

    #[test]
    fn assistant_cannot_open_transcript() {
        assert!(validate_append(&[], &Message::assistant("hi")).is_err());
    }

    #[test]
    fn consecutive_user_messages_rejected() {
        let msgs = vec![Message::user("a")];
        assert!(validate_append(&msgs, &Message::user("b")).is_err());
    }

    #[test]
    fn assistant_follows_user() {
        let msgs = vec![Message::system("s"), Message::user("hi")];
        assert!(validate_append(&msgs, &Message::assistant("yo")).is_ok());
    }

    #[test]
    fn consecutive_assistants_rejected() {
        let msgs = vec![Message::user("hi"), Message::assistant("a")];
        assert!(validate_append(&msgs, &Message::assistant("b")).is_err());
    }

    #[test]
    fn tool_requires_matching_call_id() {
        let msgs = vec![Message::user("hi"), assistant_with_calls(&["c1"])];
        assert!(validate_append(&msgs, &Message::tool("c1", "ok", vec![])).is_ok());
        assert!(validate_append(&msgs, &Message::tool("c2", "ok", vec![])).is_err());
    }

    #[test]
    fn tool_without_call_id_rejected() {
        let msgs = vec![Message::user("hi"), assistant_with_calls(&["c1"])];
        let mut t = Message::tool("c1", "ok", vec![]);
        t.tool_call_id = None;
        assert!(validate_append(&msgs, &t).is_err());
    }

    #[test]
    fn duplicate_tool_answer_rejected() {
        let msgs = vec![
            Message::user("hi"),
            assistant_with_calls(&["c1"]),
            Message::tool("c1", "first", vec![]),
        ];
        assert!(validate_append(&msgs, &Message::tool("c1", "again", vec![])).is_err());
    }

    #[test]
    fn second_call_of_same_turn_accepted() {
        let msgs = vec![
            Message::user("hi"),
            assistant_with_calls(&["c1", "c2"]),
            Message::tool("c1", "first", vec![]),
        ];
        assert!(validate_append(&msgs, &Message::tool("c2", "second", vec![])).is_ok());
    }

    #[test]
    fn tool_answer_after_turn_closed_rejected() {
        let msgs = vec![
            Message::user("hi"),
            assistant_with_calls(&["c1", "c2"]),
            Message::tool("c1", "first", vec![]),
            Message::user("next turn"),
        ];
        assert!(validate_append(&msgs, &Message::tool("c2", "late", vec![])).is_err());
    }

    #[test]
    fn user_may_follow_abandoned_dispatch() {
        // A canceled turn can leave unanswered tool calls; the next user
        // message abandons them.
        let msgs = vec![Message::user("hi"), assistant_with_calls(&["c1", "c2"])];
        assert!(validate_append(&msgs, &Message::user("never mind")).is_ok());
    }

    #[test]
    fn system_switch_allowed_between_turns() {
        let msgs = vec![
            Message::system("old"),
            Message::user("hi"),
            Message::assistant("done"),
        ];
        assert!(validate_append(&msgs, &Message::system("agent switched")).is_ok());
    }

    #[test]
    fn system_rejected_mid_dispatch() {
        let msgs = vec![Message::user("hi"), assistant_with_calls(&["c1"])];
        assert!(validate_append(&msgs, &Message::system("nope")).is_err());
    }

    // ── Unanswered call tracking ──────────────────────────────────────────────

    #[test]
    fn unanswered_tool_calls_tracks_partial_dispatch() {
        let mut chat = Chat::new("a", "c");
        chat.messages = vec![
            Message::user("hi"),
            assistant_with_calls(&["c1", "c2"]),
            Message::tool("c1", "done", vec![]),
        ];
        assert_eq!(chat.unanswered_tool_calls(), vec!["c2"]);
    }

    #[test]
    fn unanswered_tool_calls_empty_for_complete_turn() {
        let mut chat = Chat::new("a", "c");
        chat.messages = vec![
            Message::user("hi"),
            assistant_with_calls(&["c1"]),
            Message::tool("c1", "done", vec![]),
            Message::assistant("final"),
        ];
        assert!(chat.unanswered_tool_calls().is_empty());
    }

    // ── Serialisation ─────────────────────────────────────────────────────────

    #[test]
    fn chat_document_round_trips() {
        let mut chat = Chat::new("agent-1", "demo");
        chat.messages.push(Message::system("be terse"));
        chat.messages.push(Message::user("ping"));
        chat.messages.push(
            Message::assistant("pong").with_usage(Usage {
                prompt_tokens: 3,
                completion_tokens: 1,
                total_tokens: 4,
                cost: 0.001,
            }),
        );
        let json = serde_json::to_string(&chat).unwrap();
        let back: Chat = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, chat.id);
        assert_eq!(back.messages.len(), 3);
        assert_eq!(back.messages[2].usage.as_ref().unwrap().total_tokens, 4);
    }

    #[test]
    fn tool_call_serializes_with_type_tag() {
        let tc = ToolCall::function("c1", "echo", r#"{"x":"hi"}"#);
        let json = serde_json::to_string(&tc).unwrap();
        assert!(json.contains(r#""type":"function""#));
        assert!(json.contains(r#""name":"echo""#));
    }

    #[test]
    fn empty_optionals_are_omitted_from_documents() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("usage"));
    }
}
