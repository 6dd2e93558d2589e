// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Public surface used by UIs (TUI, HTTP, WebSocket).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    AdapterFactory, ChatLog, EngineError, EventBus, MessageListener, Orchestrator, TurnLimits,
};
use otto_store::{Agent, AgentRepository, Chat, ChatRepository, Message, ProviderRepository};
use otto_tools::ToolRegistry;

/// Attribute changes applied by [`ChatService::update_chat`]; `None` fields
/// are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChatUpdate {
    pub agent_id: Option<String>,
    pub model_id: Option<String>,
    pub name: Option<String>,
}

pub struct ChatService {
    log: Arc<ChatLog>,
    agents: Arc<dyn AgentRepository>,
    orchestrator: Orchestrator,
    /// Serializes turns per chat; appends additionally take the log's own
    /// short per-chat lock.
    turn_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        agents: Arc<dyn AgentRepository>,
        providers: Arc<dyn ProviderRepository>,
        tools: Arc<ToolRegistry>,
        adapters: Arc<dyn AdapterFactory>,
        limits: TurnLimits,
        bus: Arc<EventBus>,
    ) -> Self {
        let log = Arc::new(ChatLog::new(chats, Arc::clone(&providers), bus));
        let orchestrator = Orchestrator::new(
            Arc::clone(&log),
            Arc::clone(&agents),
            providers,
            tools,
            adapters,
            limits,
        );
        Self { log, agents, orchestrator, turn_locks: StdMutex::new(HashMap::new()) }
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(self.log.bus())
    }

    pub fn log(&self) -> Arc<ChatLog> {
        Arc::clone(&self.log)
    }

    fn turn_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().expect("turn lock map poisoned");
        locks.entry(chat_id.to_string()).or_default().clone()
    }

    /// Create a chat bound to `agent_id`, seeded with the agent's system
    /// prompt.  Unknown agents fail validation and persist nothing.
    pub async fn create_chat(&self, agent_id: &str, name: &str) -> Result<Chat, EngineError> {
        let agent = self.resolve_agent(agent_id).await?;
        let mut chat = Chat::new(agent_id, name);
        if !agent.system_prompt.is_empty() {
            chat.messages.push(Message::system(&agent.system_prompt));
        }
        let chat = self.log.chats().create(chat).await?;
        info!(chat_id = %chat.id, agent_id, "chat created");
        Ok(chat)
    }

    /// Update chat attributes.  Reassigning the agent mid-conversation is
    /// allowed: the new system prompt is appended as a fresh system message
    /// and supersedes the prior one on the next turn.
    pub async fn update_chat(&self, chat_id: &str, update: ChatUpdate) -> Result<Chat, EngineError> {
        let new_agent = match &update.agent_id {
            Some(agent_id) => Some(self.resolve_agent(agent_id).await?),
            None => None,
        };

        let mut switched_to: Option<Agent> = None;
        let chat = self
            .log
            .modify_chat(chat_id, |chat| {
                if let Some(agent) = &new_agent {
                    if agent.id != chat.agent_id {
                        chat.agent_id = agent.id.clone();
                        switched_to = new_agent.clone();
                    }
                }
                if let Some(model_id) = &update.model_id {
                    chat.model_id = Some(model_id.clone());
                }
                if let Some(name) = &update.name {
                    chat.name = name.clone();
                }
            })
            .await?;

        if let Some(agent) = switched_to {
            info!(chat_id, agent_id = %agent.id, "agent switched");
            let marker = format!("[agent switched]\n{}", agent.system_prompt);
            self.log.append_message(chat_id, Message::system(marker)).await?;
            return self.log.read_chat(chat_id).await;
        }
        Ok(chat)
    }

    /// Run one full turn.  Concurrent callers on the same chat serialize;
    /// the transcript is always equivalent to some serial order.
    ///
    /// On cancellation the persisted chat reflects all work completed before
    /// the cancel; re-read it with a fresh context (never the canceled one)
    /// to obtain partial results.
    pub async fn send_message(
        &self,
        chat_id: &str,
        user_text: &str,
        cancel: CancellationToken,
    ) -> Result<Message, EngineError> {
        let lock = self.turn_lock(chat_id);
        let _turn = lock.lock().await;
        self.orchestrator.run_turn(chat_id, user_text, &cancel).await
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat, EngineError> {
        self.log.read_chat(chat_id).await
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>, EngineError> {
        Ok(self.log.chats().list().await?)
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), EngineError> {
        self.log.clear_active_if(chat_id).await;
        self.log.chats().delete(chat_id).await?;
        info!(chat_id, "chat deleted");
        Ok(())
    }

    pub async fn set_active_chat(&self, chat_id: &str) -> Result<(), EngineError> {
        self.log.set_active_chat(chat_id).await
    }

    pub async fn get_active_chat(&self) -> Option<String> {
        self.log.get_active_chat().await
    }

    /// Sugar over the event bus for legacy WebSocket-style consumers: `f`
    /// receives `(chat_id, message)` after each append.
    pub fn add_message_listener(&self, f: MessageListener) {
        self.log.add_message_listener(f);
    }

    async fn resolve_agent(&self, agent_id: &str) -> Result<Agent, EngineError> {
        self.agents
            .get(agent_id)
            .await
            .map_err(|_| EngineError::Validation(format!("unknown agent {agent_id}")))
    }
}
