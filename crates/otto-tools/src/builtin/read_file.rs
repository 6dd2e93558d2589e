// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Byte ceiling for file content returned to the model.
const READ_LIMIT_BYTES: usize = 48_000;

/// Built-in tool that reads a text file, optionally a line range of it.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file and return its content.\n\
         'path' is required.  Use 'offset' (1-based line number) and 'limit'\n\
         (line count) to read a window of a large file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":   { "type": "string", "description": "Path of the file to read" },
                "offset": { "type": "integer", "description": "First line to read, 1-based (optional)" },
                "limit":  { "type": "integer", "description": "Number of lines to read (optional)" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'path' parameter");
        };

        let text = match tokio::fs::read_to_string(path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("cannot read {path}: {e}")),
        };

        let offset = call.args.get("offset").and_then(|v| v.as_u64()).unwrap_or(1).max(1) as usize;
        let limit = call.args.get("limit").and_then(|v| v.as_u64()).map(|l| l as usize);

        let selected: String = match limit {
            None if offset == 1 => text,
            _ => {
                let lines: Vec<&str> = text.lines().collect();
                let start = (offset - 1).min(lines.len());
                let end = limit.map(|l| (start + l).min(lines.len())).unwrap_or(lines.len());
                lines[start..end].join("\n")
            }
        };

        if selected.len() > READ_LIMIT_BYTES {
            let mut cut = READ_LIMIT_BYTES;
            while !selected.is_char_boundary(cut) {
                cut -= 1;
            }
            return ToolOutput::ok(
                &call.id,
                format!("{}\n[... truncated; re-read with offset/limit ...]", &selected[..cut]),
            );
        }
        ToolOutput::ok(&call.id, selected)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: "read_file".into(), args }
    }

    fn file_with(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[tokio::test]
    async fn reads_whole_file() {
        let f = file_with("alpha\nbeta\n");
        let out = ReadFileTool
            .execute(&call(json!({ "path": f.path().to_str().unwrap() })))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn reads_line_window() {
        let f = file_with("one\ntwo\nthree\nfour\n");
        let out = ReadFileTool
            .execute(&call(json!({ "path": f.path().to_str().unwrap(), "offset": 2, "limit": 2 })))
            .await;
        assert_eq!(out.content, "two\nthree");
    }

    #[tokio::test]
    async fn offset_beyond_eof_yields_empty() {
        let f = file_with("only\n");
        let out = ReadFileTool
            .execute(&call(json!({ "path": f.path().to_str().unwrap(), "offset": 10, "limit": 5 })))
            .await;
        assert!(!out.is_error);
        assert!(out.content.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let out = ReadFileTool
            .execute(&call(json!({ "path": "/nonexistent/otto-test-file" })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("cannot read"));
    }
}
