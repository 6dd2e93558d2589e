// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod agent;
mod catalog;
mod chat;
mod error;
mod file;
mod memory;
mod repository;

pub use agent::{Agent, ReasoningEffort};
pub use catalog::{ModelEntry, ProviderEntry};
pub use chat::{
    validate_append, Chat, ChatUsage, FunctionCall, Message, Role, ToolCall, ToolCallEvent, Usage,
};
pub use error::StoreError;
pub use file::JsonFileChatRepository;
pub use memory::{CatalogProviderRepository, MemoryAgentRepository, MemoryChatRepository};
pub use repository::{AgentRepository, ChatRepository, ProviderRepository};
