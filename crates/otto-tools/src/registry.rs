// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema offered to the model.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all available tools.
///
/// Immutable after construction; parallel execution needs no locking.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for the given tool names, in name order.  Names unknown to
    /// the process are skipped — the model is never offered a tool the
    /// process cannot execute.
    pub fn schemas_for(&self, names: &[String]) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| names.iter().any(|n| n == t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute one tool call from its raw JSON argument string.
    ///
    /// Unknown tools, malformed arguments and schema violations all
    /// synthesize an error output instead of failing the turn.  The
    /// invocation runs until the first of: completion, `cancel` firing, or
    /// `timeout` elapsing — the latter two produce a canceled-kind error.
    pub async fn execute_json(
        &self,
        call_id: &str,
        name: &str,
        args_json: &str,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutput::err(call_id, format!("unknown tool: {name}"));
        };

        let args: Value = match serde_json::from_str(args_json) {
            Ok(v) => v,
            Err(e) => {
                return ToolOutput::err(call_id, format!("invalid tool arguments: {e}"));
            }
        };
        if let Err(reason) = check_args(&tool.parameters_schema(), &args) {
            return ToolOutput::err(call_id, format!("tool arguments rejected: {reason}"));
        }

        let call = ToolCall { id: call_id.to_string(), name: name.to_string(), args };
        debug!(tool = name, call_id, "executing tool");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                ToolOutput::err(call_id, "tool invocation canceled")
            }
            _ = tokio::time::sleep(timeout) => {
                ToolOutput::err(
                    call_id,
                    format!("tool invocation canceled: timed out after {}s", timeout.as_secs()),
                )
            }
            out = tool.execute(&call) => out,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate parsed arguments against a tool's JSON schema.
///
/// Checks the `required` list and the declared `type` of each top-level
/// property.  Nested shapes are left to the tool itself.
fn check_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(obj) = args.as_object() else {
        return Err("arguments must be a JSON object".into());
    };
    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(format!("missing required parameter {key:?}"));
            }
        }
    }
    if let Some(props) = schema["properties"].as_object() {
        for (key, value) in obj {
            let Some(expected) = props.get(key).and_then(|p| p["type"].as_str()) else {
                continue;
            };
            let matches = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !matches {
                return Err(format!("parameter {key:?} must be of type {expected}"));
            }
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
