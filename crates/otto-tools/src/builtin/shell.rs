// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Lines preserved from the head and tail of oversized output.  Errors and
/// summaries almost always appear at the end of build/test output, so the
/// tail is at least as important as the head.
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;

/// Built-in tool that runs a shell command.
#[derive(Default)]
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr.\n\
         'command' is required and can be any non-interactive one-liner.\n\
         Output is capped at ~20 KB; when larger, the first 100 and last 100 lines\n\
         are preserved with an omission marker in the middle.\n\
         For large outputs (builds, test runs), pipe through `tail -200` to keep\n\
         only what matters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete shell one-liner to execute."
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to cwd)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command' parameter"),
        };
        let workdir = call.args.get("workdir").and_then(|v| v.as_str());

        debug!(command = %command, "running shell command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        let output = match cmd.output().await {
            Ok(o) => o,
            Err(e) => return ToolOutput::err(&call.id, format!("failed to spawn command: {e}")),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let mut text = cap_output(&combined);

        if output.status.success() {
            if text.is_empty() {
                text = "(no output)".into();
            }
            ToolOutput::ok(&call.id, text)
        } else {
            let code = output.status.code().unwrap_or(-1);
            ToolOutput::err(&call.id, format!("exit status {code}\n{text}"))
        }
    }
}

/// Keep the head and tail of oversized output with an omission marker.
fn cap_output(text: &str) -> String {
    if text.len() <= OUTPUT_LIMIT_BYTES {
        return text.to_string();
    }
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        // Few but huge lines: hard-truncate at the byte limit.
        let mut cut = OUTPUT_LIMIT_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        return format!("{}\n[... output truncated ...]", &text[..cut]);
    }
    let omitted = lines.len() - HEAD_LINES - TAIL_LINES;
    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[lines.len() - TAIL_LINES..].join("\n");
    format!("{head}\n[... {omitted} lines omitted ...]\n{tail}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
