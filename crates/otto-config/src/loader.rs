// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/otto/config.yaml"));
    paths.push(PathBuf::from("/etc/otto/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/otto/config.yaml"));
        paths.push(home.join(".config/otto/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("otto/config.yaml"));
        paths.push(cfg.join("otto/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".otto/config.yaml"));
    paths.push(PathBuf::from(".otto/config.yml"));
    paths.push(PathBuf::from("otto.yaml"));
    paths.push(PathBuf::from("otto.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_yaml(&mut merged, read_layer(&path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_yaml(&mut merged, read_layer(p)?);
    }

    let config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged).context("deserializing merged config")?
    };
    Ok(config)
}

fn read_layer(path: &Path) -> anyhow::Result<serde_yaml::Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (d, s) => *d = s,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_tmp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn explicit_path_is_loaded() {
        let f = write_tmp("engine:\n  max_steps: 7\n");
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.engine.max_steps, 7);
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        // No explicit file; search paths may or may not exist on the host,
        // but an empty merge must produce defaults.
        let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        merge_yaml(&mut merged, serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
        assert!(matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()));
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst: serde_yaml::Value = serde_yaml::from_str("a: 1\nb: 2\n").unwrap();
        let src: serde_yaml::Value = serde_yaml::from_str("b: 3\n").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"], serde_yaml::Value::from(1));
        assert_eq!(dst["b"], serde_yaml::Value::from(3));
    }

    #[test]
    fn merge_is_recursive_for_mappings() {
        let mut dst: serde_yaml::Value =
            serde_yaml::from_str("engine:\n  max_steps: 5\n  event_buffer: 10\n").unwrap();
        let src: serde_yaml::Value = serde_yaml::from_str("engine:\n  max_steps: 9\n").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["engine"]["max_steps"], serde_yaml::Value::from(9));
        assert_eq!(dst["engine"]["event_buffer"], serde_yaml::Value::from(10));
    }

    #[test]
    fn agents_parse_from_explicit_file() {
        let f = write_tmp(
            "agents:\n  - name: helper\n    model: gpt-4o\n    provider: openai\n    tools: [shell]\n",
        );
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].tools, vec!["shell"]);
    }
}
