// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Document-per-chat JSON persistence.
//!
//! Each chat is stored as `<data_dir>/<chat_id>.json`.  Writes go through a
//! temp file + rename so a crash never leaves a half-written document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Chat, ChatRepository, StoreError};

pub struct JsonFileChatRepository {
    dir: PathBuf,
    /// Serializes writes; reads go straight to the filesystem.
    write_lock: Mutex<()>,
}

impl JsonFileChatRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        // Ids are UUIDs minted by this process; reject anything that could
        // escape the data directory.
        self.dir.join(format!("{}.json", sanitize_id(id)))
    }

    async fn write_document(&self, chat: &Chat) -> Result<(), StoreError> {
        let path = self.path_for(&chat.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(chat)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(chat_id = %chat.id, path = %path.display(), "chat document written");
        Ok(())
    }

    async fn read_document(&self, path: &Path) -> Result<Chat, StoreError> {
        let body = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(format!("chat document {}", path.display()))
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[async_trait]
impl ChatRepository for JsonFileChatRepository {
    async fn create(&self, chat: Chat) -> Result<Chat, StoreError> {
        let _g = self.write_lock.lock().await;
        let path = self.path_for(&chat.id);
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::Conflict(format!("chat {} already exists", chat.id)));
        }
        self.write_document(&chat).await?;
        Ok(chat)
    }

    async fn get(&self, id: &str) -> Result<Chat, StoreError> {
        self.read_document(&self.path_for(id)).await
    }

    async fn update(&self, mut chat: Chat) -> Result<Chat, StoreError> {
        let _g = self.write_lock.lock().await;
        let existing = self.read_document(&self.path_for(&chat.id)).await?;
        chat.created_at = existing.created_at;
        chat.updated_at = Utc::now();
        self.write_document(&chat).await?;
        Ok(chat)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _g = self.write_lock.lock().await;
        let path = self.path_for(id);
        tokio::fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(format!("chat {id}"))
            } else {
                StoreError::Io(e)
            }
        })
    }

    async fn list(&self) -> Result<Vec<Chat>, StoreError> {
        let mut chats = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_document(&path).await {
                Ok(chat) => chats.push(chat),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable chat document"),
            }
        }
        chats.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(chats)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    fn repo() -> (tempfile::TempDir, JsonFileChatRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileChatRepository::new(dir.path()).unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn create_get_round_trip() {
        let (_dir, repo) = repo();
        let mut chat = Chat::new("a1", "demo");
        chat.messages.push(Message::user("hello"));
        let chat = repo.create(chat).await.unwrap();
        let got = repo.get(&chat.id).await.unwrap();
        assert_eq!(got.messages.len(), 1);
        assert_eq!(got.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn update_persists_appends_and_keeps_created_at() {
        let (_dir, repo) = repo();
        let chat = repo.create(Chat::new("a1", "demo")).await.unwrap();
        let created = chat.created_at;

        let mut modified = chat.clone();
        modified.messages.push(Message::user("hi"));
        repo.update(modified).await.unwrap();

        let got = repo.get(&chat.id).await.unwrap();
        assert_eq!(got.messages.len(), 1);
        assert_eq!(got.created_at, created);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (_dir, repo) = repo();
        let chat = repo.create(Chat::new("a1", "demo")).await.unwrap();
        repo.delete(&chat.id).await.unwrap();
        assert!(matches!(repo.get(&chat.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_skips_foreign_files() {
        let (dir, repo) = repo();
        repo.create(Chat::new("a1", "demo")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a chat").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize_id("../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_id("abc-123_DEF"), "abc-123_DEF");
    }
}
