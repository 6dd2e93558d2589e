// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::Serialize;

use otto_store::ToolCallEvent;

/// A hint that the transcript of `chat_id` changed.  Deliberately carries no
/// message data: subscribers re-read the chat to observe the authoritative
/// state, so a dropped or reordered event can never cause divergence.
#[derive(Debug, Clone)]
pub struct MessageHistoryEvent {
    pub chat_id: String,
}

/// Serializable envelope for UI/WebSocket consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum UiEvent {
    #[serde(rename = "tool_call_update")]
    ToolCallUpdate {
        tool_call_id: String,
        tool_name: String,
        result: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
    },
    #[serde(rename = "message_history_refresh")]
    MessageHistoryRefresh { chat_id: String },
}

impl From<&ToolCallEvent> for UiEvent {
    fn from(ev: &ToolCallEvent) -> Self {
        Self::ToolCallUpdate {
            tool_call_id: ev.tool_call_id.clone(),
            tool_name: ev.tool_name.clone(),
            result: ev.result.clone(),
            error: ev.error.clone(),
            diff: ev.diff.clone(),
        }
    }
}

impl From<&MessageHistoryEvent> for UiEvent {
    fn from(ev: &MessageHistoryEvent) -> Self {
        Self::MessageHistoryRefresh { chat_id: ev.chat_id.clone() }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
