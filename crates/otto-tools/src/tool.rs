// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.
///
/// `content` is the string payload fed back to the model.  Tools that
/// produce structured results encode them as JSON with a short `summary`
/// field so UIs can render compactly.  File-mutating tools additionally set
/// `diff` to a unified diff of the change.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub diff: Option<String>,
    /// If true, the tool execution failed non-fatally; the message is fed
    /// back to the model like any other result.
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), diff: None, is_error: false }
    }

    /// Error result containing a plain-text error message.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: msg.into(), diff: None, is_error: true }
    }

    /// Attach a unified diff describing the change this tool made.
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }
}

/// Trait that every built-in and user-defined tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_output_carries_content() {
        let o = ToolOutput::ok("c1", "result");
        assert_eq!(o.call_id, "c1");
        assert_eq!(o.content, "result");
        assert!(!o.is_error);
        assert!(o.diff.is_none());
    }

    #[test]
    fn err_output_sets_flag() {
        let o = ToolOutput::err("c1", "boom");
        assert!(o.is_error);
        assert_eq!(o.content, "boom");
    }

    #[test]
    fn with_diff_attaches_patch() {
        let o = ToolOutput::ok("c1", "done").with_diff("--- a\n+++ b\n");
        assert!(o.diff.unwrap().starts_with("---"));
    }
}
