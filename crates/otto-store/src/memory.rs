// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Agent, AgentRepository, Chat, ChatRepository, ModelEntry, ProviderEntry, ProviderRepository,
    StoreError,
};

/// In-memory chat store.  Used by tests and as the default wiring when no
/// data directory is configured.
#[derive(Default)]
pub struct MemoryChatRepository {
    chats: RwLock<HashMap<String, Chat>>,
}

impl MemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for MemoryChatRepository {
    async fn create(&self, chat: Chat) -> Result<Chat, StoreError> {
        let mut chats = self.chats.write().await;
        if chats.contains_key(&chat.id) {
            return Err(StoreError::Conflict(format!("chat {} already exists", chat.id)));
        }
        chats.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn get(&self, id: &str) -> Result<Chat, StoreError> {
        self.chats
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("chat {id}")))
    }

    async fn update(&self, mut chat: Chat) -> Result<Chat, StoreError> {
        let mut chats = self.chats.write().await;
        let existing = chats
            .get(&chat.id)
            .ok_or_else(|| StoreError::NotFound(format!("chat {}", chat.id)))?;
        // id and created_at are immutable; keep the stored values.
        chat.created_at = existing.created_at;
        chat.updated_at = Utc::now();
        chats.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.chats
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("chat {id}")))
    }

    async fn list(&self) -> Result<Vec<Chat>, StoreError> {
        let mut all: Vec<Chat> = self.chats.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

/// Read-only agent store seeded at construction (typically from config).
#[derive(Default)]
pub struct MemoryAgentRepository {
    agents: HashMap<String, Agent>,
}

impl MemoryAgentRepository {
    pub fn new(agents: impl IntoIterator<Item = Agent>) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }
}

#[async_trait]
impl AgentRepository for MemoryAgentRepository {
    async fn get(&self, id: &str) -> Result<Agent, StoreError> {
        self.agents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("agent {id}")))
    }

    async fn list(&self) -> Result<Vec<Agent>, StoreError> {
        let mut all: Vec<Agent> = self.agents.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

/// Provider catalog backed by a fixed entry list.
#[derive(Default)]
pub struct CatalogProviderRepository {
    entries: HashMap<String, ProviderEntry>,
}

impl CatalogProviderRepository {
    pub fn new(entries: impl IntoIterator<Item = ProviderEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.provider_type.clone(), e))
                .collect(),
        }
    }
}

impl ProviderRepository for CatalogProviderRepository {
    fn get(&self, provider_type: &str) -> Option<ProviderEntry> {
        self.entries.get(provider_type).cloned()
    }

    fn model(&self, provider_type: &str, model: &str) -> Option<ModelEntry> {
        self.entries
            .get(provider_type)
            .and_then(|e| e.model(model))
            .cloned()
    }

    fn list(&self) -> Vec<ProviderEntry> {
        let mut all: Vec<ProviderEntry> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.provider_type.cmp(&b.provider_type));
        all
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    fn agent(id: &str) -> Agent {
        Agent {
            id: id.into(),
            name: id.into(),
            system_prompt: "be brief".into(),
            model: "gpt-4o".into(),
            provider_type: "openai".into(),
            endpoint: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            context_window: None,
            reasoning_effort: Default::default(),
            tools: vec![],
        }
    }

    // ── Chat repository ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = MemoryChatRepository::new();
        let chat = repo.create(Chat::new("a1", "demo")).await.unwrap();
        let got = repo.get(&chat.id).await.unwrap();
        assert_eq!(got.name, "demo");
    }

    #[tokio::test]
    async fn get_unknown_chat_is_not_found() {
        let repo = MemoryChatRepository::new();
        assert!(matches!(repo.get("nope").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let repo = MemoryChatRepository::new();
        let chat = repo.create(Chat::new("a1", "demo")).await.unwrap();
        assert!(matches!(repo.create(chat).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_preserves_id_and_created_at() {
        let repo = MemoryChatRepository::new();
        let chat = repo.create(Chat::new("a1", "demo")).await.unwrap();
        let created = chat.created_at;

        let mut modified = chat.clone();
        modified.name = "renamed".into();
        modified.created_at = Utc::now(); // must be ignored
        modified.messages.push(Message::user("hi"));
        let updated = repo.update(modified).await.unwrap();

        assert_eq!(updated.created_at, created);
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.messages.len(), 1);
        assert!(updated.updated_at >= created);
    }

    #[tokio::test]
    async fn update_unknown_chat_is_not_found() {
        let repo = MemoryChatRepository::new();
        let chat = Chat::new("a1", "ghost");
        assert!(matches!(repo.update(chat).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_and_is_not_idempotent() {
        let repo = MemoryChatRepository::new();
        let chat = repo.create(Chat::new("a1", "demo")).await.unwrap();
        repo.delete(&chat.id).await.unwrap();
        assert!(repo.delete(&chat.id).await.is_err());
        assert!(repo.get(&chat.id).await.is_err());
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let repo = MemoryChatRepository::new();
        let a = repo.create(Chat::new("a1", "first")).await.unwrap();
        let b = repo.create(Chat::new("a1", "second")).await.unwrap();
        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at <= all[1].created_at);
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&a.id.as_str()) && ids.contains(&b.id.as_str()));
    }

    // ── Agent repository ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn agent_lookup_by_id() {
        let repo = MemoryAgentRepository::new([agent("a1"), agent("a2")]);
        assert_eq!(repo.get("a1").await.unwrap().id, "a1");
        assert!(repo.get("a3").await.is_err());
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    // ── Provider catalog ──────────────────────────────────────────────────────

    #[test]
    fn provider_and_model_lookup() {
        let repo = CatalogProviderRepository::new([ProviderEntry {
            provider_type: "openai".into(),
            base_url: None,
            api_key_env: Some("OPENAI_API_KEY".into()),
            models: vec![ModelEntry {
                name: "gpt-4o".into(),
                input_price_per_mille: 0.0025,
                output_price_per_mille: 0.01,
                context_window: 128_000,
            }],
        }]);
        assert!(repo.get("openai").is_some());
        assert!(repo.get("acme").is_none());
        assert!(repo.model("openai", "gpt-4o").is_some());
        assert!(repo.model("openai", "gpt-1").is_none());
    }
}
