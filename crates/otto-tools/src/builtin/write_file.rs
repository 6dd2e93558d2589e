// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use similar::TextDiff;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Built-in tool that writes (creates or overwrites) a text file.
///
/// The result is a JSON payload with a `summary` field; the unified diff of
/// the change travels separately in [`ToolOutput::diff`] so UIs can render
/// it without parsing the payload.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a text file, creating it (and parent directories) when missing\n\
         and overwriting it otherwise.  'path' and 'content' are required."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":    { "type": "string", "description": "Path of the file to write" },
                "content": { "type": "string", "description": "Full new file content" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'path' parameter");
        };
        let Some(content) = call.args.get("content").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'content' parameter");
        };

        let old = tokio::fs::read_to_string(path).await.unwrap_or_default();

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolOutput::err(&call.id, format!("cannot create {}: {e}", parent.display()));
                }
            }
        }
        if let Err(e) = tokio::fs::write(path, content).await {
            return ToolOutput::err(&call.id, format!("cannot write {path}: {e}"));
        }

        let diff = TextDiff::from_lines(old.as_str(), content)
            .unified_diff()
            .header(path, path)
            .to_string();

        let summary = if old.is_empty() {
            format!("created {path}")
        } else {
            format!("updated {path}")
        };
        let payload = json!({
            "summary": summary,
            "path": path,
            "bytes_written": content.len(),
        });
        ToolOutput::ok(&call.id, payload.to_string()).with_diff(diff)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: "write_file".into(), args }
    }

    #[tokio::test]
    async fn creates_file_and_reports_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");
        let out = WriteFileTool
            .execute(&call(json!({ "path": path.to_str().unwrap(), "content": "hello\n" })))
            .await;
        assert!(!out.is_error);
        let payload: Value = serde_json::from_str(&out.content).unwrap();
        assert!(payload["summary"].as_str().unwrap().starts_with("created"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn overwrites_and_produces_diff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "old line\n").unwrap();
        let out = WriteFileTool
            .execute(&call(json!({ "path": path.to_str().unwrap(), "content": "new line\n" })))
            .await;
        let diff = out.diff.expect("diff must be present");
        assert!(diff.contains("-old line"));
        assert!(diff.contains("+new line"));
        let payload: Value = serde_json::from_str(&out.content).unwrap();
        assert!(payload["summary"].as_str().unwrap().starts_with("updated"));
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep/nested/f.txt");
        let out = WriteFileTool
            .execute(&call(json!({ "path": path.to_str().unwrap(), "content": "x" })))
            .await;
        assert!(!out.is_error);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let out = WriteFileTool.execute(&call(json!({ "path": "/tmp/x" }))).await;
        assert!(out.is_error);
    }
}
