// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Message log and usage accountant.
//!
//! All transcript mutations funnel through this type: appends are validated
//! against the role grammar, committed to the repository under a short
//! per-chat lock, and only then announced on the event bus.  The lock is
//! never held across provider or tool I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use tokio::sync::Mutex;
use tracing::debug;

use crate::{EngineError, EventBus};
use otto_model::TokenUsage;
use otto_store::{validate_append, Chat, ChatRepository, Message, ProviderRepository, Usage};

/// Callback invoked after every append; receives `(chat_id, message)`.
pub type MessageListener = Arc<dyn Fn(&str, &Message) + Send + Sync>;

pub struct ChatLog {
    chats: Arc<dyn ChatRepository>,
    providers: Arc<dyn ProviderRepository>,
    bus: Arc<EventBus>,
    /// Per-chat append locks, created on first use.
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    /// The at-most-one active chat of this process.
    active: Mutex<Option<String>>,
    listeners: StdRwLock<Vec<MessageListener>>,
}

impl ChatLog {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        providers: Arc<dyn ProviderRepository>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            chats,
            providers,
            bus,
            locks: StdMutex::new(HashMap::new()),
            active: Mutex::new(None),
            listeners: StdRwLock::new(Vec::new()),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn chats(&self) -> &Arc<dyn ChatRepository> {
        &self.chats
    }

    fn chat_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.entry(chat_id.to_string()).or_default().clone()
    }

    /// Append a message: grammar-check, commit, then publish the history
    /// refresh and notify listeners.
    pub async fn append_message(&self, chat_id: &str, msg: Message) -> Result<Message, EngineError> {
        let msg = self.append_committed(chat_id, msg).await?;
        self.bus.publish_history(chat_id);
        self.notify_listeners(chat_id, &msg);
        Ok(msg)
    }

    /// Append a tool-result message.  The tool-call events embedded in the
    /// message are broadcast after the commit, *before* the history refresh,
    /// so a subscriber that reacts to the refresh has already seen the tool
    /// update.
    pub async fn append_tool_result(
        &self,
        chat_id: &str,
        msg: Message,
    ) -> Result<Message, EngineError> {
        let msg = self.append_committed(chat_id, msg).await?;
        for event in msg.tool_call_events.as_deref().unwrap_or_default() {
            self.bus.publish_tool_call(event);
        }
        self.bus.publish_history(chat_id);
        self.notify_listeners(chat_id, &msg);
        Ok(msg)
    }

    async fn append_committed(&self, chat_id: &str, msg: Message) -> Result<Message, EngineError> {
        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;

        let mut chat = self.chats.get(chat_id).await?;
        validate_append(&chat.messages, &msg)?;
        debug!(chat_id, role = ?msg.role, message_id = %msg.id, "appending message");
        chat.messages.push(msg.clone());
        self.chats.update(chat).await?;
        Ok(msg)
    }

    fn notify_listeners(&self, chat_id: &str, msg: &Message) {
        let listeners = self.listeners.read().expect("listener list poisoned");
        for listener in listeners.iter() {
            listener(chat_id, msg);
        }
    }

    /// Price raw token counts using the catalog entry of `(provider, model)`
    /// at this moment.  Unknown models price at zero — usage is still
    /// tallied, only cost is lost.
    pub fn price_usage(&self, provider_type: &str, model: &str, tokens: &TokenUsage) -> Usage {
        let cost = self
            .providers
            .model(provider_type, model)
            .map(|entry| entry.cost(tokens.prompt_tokens, tokens.completion_tokens))
            .unwrap_or(0.0);
        Usage {
            prompt_tokens: tokens.prompt_tokens,
            completion_tokens: tokens.completion_tokens,
            total_tokens: tokens.total_tokens,
            cost,
        }
    }

    /// Atomically add `delta` to the chat's cumulative usage.
    pub async fn update_usage(&self, chat_id: &str, delta: &Usage) -> Result<(), EngineError> {
        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;
        let mut chat = self.chats.get(chat_id).await?;
        chat.usage.add(delta);
        self.chats.update(chat).await?;
        Ok(())
    }

    pub async fn read_chat(&self, chat_id: &str) -> Result<Chat, EngineError> {
        Ok(self.chats.get(chat_id).await?)
    }

    /// Mutate chat attributes (name, agent binding, model override) under
    /// the per-chat lock so a concurrently running turn cannot lose appends
    /// to a read-modify-write race.
    pub async fn modify_chat(
        &self,
        chat_id: &str,
        mutate: impl FnOnce(&mut Chat),
    ) -> Result<Chat, EngineError> {
        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;
        let mut chat = self.chats.get(chat_id).await?;
        mutate(&mut chat);
        Ok(self.chats.update(chat).await?)
    }

    /// Make `chat_id` the process's active chat, clearing the previous
    /// holder.  At most one chat is active at any time.
    pub async fn set_active_chat(&self, chat_id: &str) -> Result<(), EngineError> {
        // Verify the chat exists before taking the flag.
        let _ = self.chats.get(chat_id).await?;
        let mut active = self.active.lock().await;
        if active.as_deref() == Some(chat_id) {
            return Ok(());
        }
        if let Some(prev) = active.take() {
            // Best effort: the flag is process state, the persisted bit is
            // only a convenience for listings.
            if let Ok(prev_chat) = self.chats.get(&prev).await {
                let mut prev_chat = prev_chat;
                prev_chat.active = false;
                let _ = self.chats.update(prev_chat).await;
            }
        }
        let mut chat = self.chats.get(chat_id).await?;
        chat.active = true;
        self.chats.update(chat).await?;
        *active = Some(chat_id.to_string());
        Ok(())
    }

    pub async fn get_active_chat(&self) -> Option<String> {
        self.active.lock().await.clone()
    }

    /// Clear the active flag when it points at `chat_id` (chat deletion).
    pub async fn clear_active_if(&self, chat_id: &str) {
        let mut active = self.active.lock().await;
        if active.as_deref() == Some(chat_id) {
            *active = None;
        }
    }

    pub fn add_message_listener(&self, listener: MessageListener) {
        self.listeners
            .write()
            .expect("listener list poisoned")
            .push(listener);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use otto_store::{
        CatalogProviderRepository, MemoryChatRepository, ModelEntry, ProviderEntry, ToolCallEvent,
    };

    fn catalog() -> CatalogProviderRepository {
        CatalogProviderRepository::new([ProviderEntry {
            provider_type: "openai".into(),
            base_url: None,
            api_key_env: None,
            models: vec![ModelEntry {
                name: "gpt-4o".into(),
                input_price_per_mille: 1.0,
                output_price_per_mille: 2.0,
                context_window: 128_000,
            }],
        }])
    }

    async fn log_with_chat() -> (Arc<ChatLog>, String) {
        let chats = Arc::new(MemoryChatRepository::new());
        let chat = chats.create(Chat::new("a1", "demo")).await.unwrap();
        let log = Arc::new(ChatLog::new(
            chats,
            Arc::new(catalog()),
            Arc::new(EventBus::new()),
        ));
        (log, chat.id)
    }

    #[tokio::test]
    async fn append_persists_and_publishes_history() {
        let (log, chat_id) = log_with_chat().await;
        let (_s, mut rx) = log.bus().subscribe_history();
        log.append_message(&chat_id, Message::user("hi")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().chat_id, chat_id);
        let chat = log.read_chat(&chat_id).await.unwrap();
        assert_eq!(chat.messages.len(), 1);
    }

    #[tokio::test]
    async fn grammar_violation_rejects_append_without_event() {
        let (log, chat_id) = log_with_chat().await;
        let (_s, mut rx) = log.bus().subscribe_history();
        let err = log
            .append_message(&chat_id, Message::assistant("orphan"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tool_event_precedes_history_refresh() {
        let (log, chat_id) = log_with_chat().await;
        log.append_message(&chat_id, Message::user("go")).await.unwrap();
        log.append_message(
            &chat_id,
            Message::assistant_with_tool_calls(
                "",
                vec![otto_store::ToolCall::function("c1", "echo", "{}")],
            ),
        )
        .await
        .unwrap();

        let (_t, mut tool_rx) = log.bus().subscribe_tool_calls();
        let (_h, mut hist_rx) = log.bus().subscribe_history();
        let event = ToolCallEvent::new("c1", "echo", "{}", "hi", "", None);
        log.append_tool_result(&chat_id, Message::tool("c1", "hi", vec![event]))
            .await
            .unwrap();

        // The tool update is buffered before the refresh is published.
        assert_eq!(tool_rx.recv().await.unwrap().tool_call_id, "c1");
        assert_eq!(hist_rx.recv().await.unwrap().chat_id, chat_id);
    }

    #[tokio::test]
    async fn usage_is_priced_from_catalog_and_accumulated() {
        let (log, chat_id) = log_with_chat().await;
        let usage = log.price_usage(
            "openai",
            "gpt-4o",
            &TokenUsage { prompt_tokens: 1000, completion_tokens: 500, total_tokens: 1500 },
        );
        assert!((usage.cost - (1.0 + 1.0)).abs() < 1e-9);

        log.update_usage(&chat_id, &usage).await.unwrap();
        log.update_usage(&chat_id, &usage).await.unwrap();
        let chat = log.read_chat(&chat_id).await.unwrap();
        assert_eq!(chat.usage.total_tokens, 3000);
        assert!((chat.usage.cost - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_model_prices_at_zero() {
        let (log, _chat_id) = log_with_chat().await;
        let usage = log.price_usage("openai", "gpt-unknown", &TokenUsage::new(10, 10));
        assert_eq!(usage.cost, 0.0);
        assert_eq!(usage.total_tokens, 20);
    }

    #[tokio::test]
    async fn active_chat_is_exclusive() {
        let chats = Arc::new(MemoryChatRepository::new());
        let a = chats.create(Chat::new("a1", "one")).await.unwrap();
        let b = chats.create(Chat::new("a1", "two")).await.unwrap();
        let log = ChatLog::new(chats.clone(), Arc::new(catalog()), Arc::new(EventBus::new()));

        log.set_active_chat(&a.id).await.unwrap();
        log.set_active_chat(&b.id).await.unwrap();
        assert_eq!(log.get_active_chat().await.as_deref(), Some(b.id.as_str()));
        assert!(!chats.get(&a.id).await.unwrap().active);
        assert!(chats.get(&b.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn clear_active_if_only_matches_holder() {
        let (log, chat_id) = log_with_chat().await;
        log.set_active_chat(&chat_id).await.unwrap();
        log.clear_active_if("someone-else").await;
        assert!(log.get_active_chat().await.is_some());
        log.clear_active_if(&chat_id).await;
        assert!(log.get_active_chat().await.is_none());
    }

    #[tokio::test]
    async fn listeners_fire_after_append() {
        let (log, chat_id) = log_with_chat().await;
        let seen: Arc<StdMutex<Vec<String>>> = Arc::default();
        let seen_clone = Arc::clone(&seen);
        log.add_message_listener(Arc::new(move |chat, msg| {
            seen_clone
                .lock()
                .unwrap()
                .push(format!("{chat}:{:?}", msg.role));
        }));
        log.append_message(&chat_id, Message::user("hi")).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with(&chat_id));
    }
}
