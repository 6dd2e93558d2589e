// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{Agent, Chat, ModelEntry, ProviderEntry, StoreError};

/// Durable storage for chats.  One document per chat, embedded messages,
/// primary-key lookup only.
///
/// `update` replaces `messages`, `usage`, `agent_id`, `model_id`, `name`,
/// `active` and `updated_at` atomically.  Implementations must not mutate
/// `id` or `created_at`, and callers must never rewrite an existing
/// message's `id`, `role` or `timestamp`.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create(&self, chat: Chat) -> Result<Chat, StoreError>;
    async fn get(&self, id: &str) -> Result<Chat, StoreError>;
    async fn update(&self, chat: Chat) -> Result<Chat, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<Chat>, StoreError>;
}

/// Read access to agent definitions.  The engine takes a value snapshot per
/// turn and never writes back.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Agent, StoreError>;
    async fn list(&self) -> Result<Vec<Agent>, StoreError>;
}

/// Read-only provider catalog for endpoint and pricing lookup.
pub trait ProviderRepository: Send + Sync {
    fn get(&self, provider_type: &str) -> Option<ProviderEntry>;
    /// Model entry for `(provider_type, model)`, used for pricing at the
    /// moment of a provider call.
    fn model(&self, provider_type: &str, model: &str) -> Option<ModelEntry>;
    fn list(&self) -> Vec<ProviderEntry>;
}
