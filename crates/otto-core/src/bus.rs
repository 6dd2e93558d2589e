// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Process-wide event broker with two topics: tool-call updates and
//! message-history refresh hints.
//!
//! Delivery is best-effort: every subscriber owns a bounded buffer and a
//! full buffer drops the event for that subscriber (counted, never
//! blocking).  Tool events are visual hints and history events only carry a
//! chat id that subscribers use to re-read authoritative state, so loss is
//! safe.  Publishers take the subscriber map's read lock only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::trace;

use crate::events::MessageHistoryEvent;
use otto_store::ToolCallEvent;

/// Default bounded buffer per subscriber.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 50;

/// Identifies one subscription for [`EventBus::unsubscribe_tool_calls`] /
/// [`EventBus::unsubscribe_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Topic<T> {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<T>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Clone> Topic<T> {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn subscribe(&self, capacity: usize) -> (SubscriberId, mpsc::Receiver<T>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribers
            .write()
            .expect("subscriber map poisoned")
            .insert(id, tx);
        (SubscriberId(id), rx)
    }

    fn unsubscribe(&self, id: SubscriberId) {
        // Idempotent; dropping the sender closes the channel after the
        // receiver drains what is already buffered.
        self.subscribers
            .write()
            .expect("subscriber map poisoned")
            .remove(&id.0);
    }

    fn publish(&self, event: &T) {
        let mut gone: Vec<u64> = Vec::new();
        {
            let subs = self.subscribers.read().expect("subscriber map poisoned");
            for (id, tx) in subs.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(subscriber = id, "subscriber buffer full; event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
                }
            }
        }
        if !gone.is_empty() {
            let mut subs = self.subscribers.write().expect("subscriber map poisoned");
            for id in gone {
                subs.remove(&id);
            }
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct EventBus {
    capacity: usize,
    tool_calls: Topic<ToolCallEvent>,
    history: Topic<MessageHistoryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tool_calls: Topic::new(),
            history: Topic::new(),
        }
    }

    pub fn subscribe_tool_calls(&self) -> (SubscriberId, mpsc::Receiver<ToolCallEvent>) {
        self.tool_calls.subscribe(self.capacity)
    }

    pub fn subscribe_history(&self) -> (SubscriberId, mpsc::Receiver<MessageHistoryEvent>) {
        self.history.subscribe(self.capacity)
    }

    pub fn unsubscribe_tool_calls(&self, id: SubscriberId) {
        self.tool_calls.unsubscribe(id);
    }

    pub fn unsubscribe_history(&self, id: SubscriberId) {
        self.history.unsubscribe(id);
    }

    pub fn publish_tool_call(&self, event: &ToolCallEvent) {
        self.tool_calls.publish(event);
    }

    pub fn publish_history(&self, chat_id: &str) {
        self.history
            .publish(&MessageHistoryEvent { chat_id: chat_id.to_string() });
    }

    /// Total events dropped across both topics because a subscriber buffer
    /// was full.  Diagnostic only.
    pub fn dropped_events(&self) -> u64 {
        self.tool_calls.dropped() + self.history.dropped()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
