// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Config → engine wiring: translate the YAML schema into repositories and
//! assemble the chat service.

use std::sync::Arc;
use std::time::Duration;

use otto_config::{AgentDef, Config};
use otto_core::{ChatService, ConfigAdapterFactory, EventBus, RetryPolicy, TurnLimits};
use otto_store::{
    Agent, CatalogProviderRepository, ChatRepository, JsonFileChatRepository,
    MemoryAgentRepository, MemoryChatRepository, ModelEntry, ProviderEntry, ReasoningEffort,
};
use otto_tools::builtin::default_registry;

pub fn agent_from_def(def: &AgentDef) -> Agent {
    let effort = match def.reasoning_effort.as_deref() {
        Some("low") => ReasoningEffort::Low,
        Some("medium") => ReasoningEffort::Medium,
        Some("high") => ReasoningEffort::High,
        _ => ReasoningEffort::None,
    };
    Agent {
        id: def.id.clone().unwrap_or_else(|| def.name.clone()),
        name: def.name.clone(),
        system_prompt: def.system_prompt.clone(),
        model: def.model.clone(),
        provider_type: def.provider.clone(),
        endpoint: def.endpoint.clone(),
        api_key: def.api_key.clone(),
        temperature: def.temperature,
        max_tokens: def.max_tokens,
        context_window: def.context_window,
        reasoning_effort: effort,
        tools: def.tools.clone(),
    }
}

pub fn provider_entries(config: &Config) -> Vec<ProviderEntry> {
    config
        .providers
        .iter()
        .map(|(provider_type, def)| ProviderEntry {
            provider_type: provider_type.clone(),
            base_url: def.base_url.clone(),
            api_key_env: def.api_key_env.clone(),
            models: def
                .models
                .iter()
                .map(|m| ModelEntry {
                    name: m.name.clone(),
                    input_price_per_mille: m.input_price_per_mille,
                    output_price_per_mille: m.output_price_per_mille,
                    context_window: m.context_window,
                })
                .collect(),
        })
        .collect()
}

pub fn turn_limits(config: &Config) -> TurnLimits {
    TurnLimits {
        max_steps: config.engine.max_steps,
        provider_timeout: Duration::from_secs(config.engine.provider_timeout_secs),
        turn_timeout: Duration::from_secs(config.engine.turn_timeout_secs),
        tool_timeout: Duration::from_secs(config.engine.tool_timeout_secs),
        retry: RetryPolicy::default(),
    }
}

pub fn build_service(config: &Config) -> anyhow::Result<ChatService> {
    let chats: Arc<dyn ChatRepository> = match &config.data_dir {
        Some(dir) => Arc::new(JsonFileChatRepository::new(dir.clone())?),
        None => Arc::new(MemoryChatRepository::new()),
    };
    let agents = Arc::new(MemoryAgentRepository::new(
        config.agents.iter().map(agent_from_def),
    ));
    let providers = Arc::new(CatalogProviderRepository::new(provider_entries(config)));
    let bus = Arc::new(EventBus::with_capacity(config.engine.event_buffer));

    Ok(ChatService::new(
        chats,
        agents,
        providers,
        Arc::new(default_registry()),
        Arc::new(ConfigAdapterFactory::new()),
        turn_limits(config),
        bus,
    ))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
