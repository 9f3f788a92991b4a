//! Thread Registry
//!
//! Durable mapping from chat channel to remote conversation. Entries are
//! created lazily on the first question in a channel and are only removed by
//! explicit administrative actions (`forget`, `reset`).
//!
//! # Concurrency
//!
//! Binds from concurrent requests are last-write-wins at the mapping level.
//! Persisting is serialized by a registry-scoped lock and every save writes a
//! snapshot taken while holding that lock, so the newest file on disk always
//! contains every bind that completed before it.
//!
//! # Persistence failures
//!
//! A failed save leaves the in-memory mapping updated and reports
//! `EngineError::Persistence`. Callers keep serving the request; the mapping
//! is simply not crash-safe until the next successful save.

use sdk::errors::EngineError;
use sdk::types::{ChannelId, ConversationId};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub mod store;

pub use store::{JsonFileStore, RegistryStore, Snapshot};

pub struct ThreadRegistry {
    entries: RwLock<HashMap<ChannelId, ConversationId>>,
    store: Box<dyn RegistryStore>,
    persist_lock: Mutex<()>,
}

impl ThreadRegistry {
    /// Loads the registry from `store`. Never fails: unreadable storage
    /// starts an empty registry.
    pub async fn load(store: Box<dyn RegistryStore>) -> Self {
        let snapshot = store.load().await;
        info!("Loaded {} thread mapping(s)", snapshot.len());

        Self {
            entries: RwLock::new(snapshot.into_iter().collect()),
            store,
            persist_lock: Mutex::new(()),
        }
    }

    /// Convenience for the JSON file store.
    pub async fn open(path: impl Into<std::path::PathBuf>) -> Self {
        Self::load(Box::new(JsonFileStore::new(path))).await
    }

    /// Conversation bound to `channel`, if any.
    pub async fn resolve(&self, channel: &ChannelId) -> Option<ConversationId> {
        self.entries.read().await.get(channel).cloned()
    }

    /// Binds `channel` to `conversation` and persists the registry.
    ///
    /// The in-memory mapping is updated even if persisting fails.
    pub async fn bind(
        &self,
        channel: &ChannelId,
        conversation: &ConversationId,
    ) -> Result<(), EngineError> {
        let previous = self
            .entries
            .write()
            .await
            .insert(channel.clone(), conversation.clone());

        if let Some(previous) = previous.filter(|p| p != conversation) {
            warn!(
                "Channel {} rebound from {} to {}",
                channel, previous, conversation
            );
        }

        self.persist().await
    }

    /// Removes the mapping for `channel`; its next question starts a new
    /// conversation. Returns the conversation that was bound.
    pub async fn forget(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<ConversationId>, EngineError> {
        let removed = self.entries.write().await.remove(channel);
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Drops every mapping. Returns how many were removed.
    pub async fn reset(&self) -> Result<usize, EngineError> {
        let removed = {
            let mut entries = self.entries.write().await;
            let count = entries.len();
            entries.clear();
            count
        };
        info!("Registry reset, {} mapping(s) dropped", removed);
        self.persist().await?;
        Ok(removed)
    }

    /// Ordered copy of the current mapping.
    pub async fn snapshot(&self) -> Snapshot {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn persist(&self) -> Result<(), EngineError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot().await;

        self.store.save(&snapshot).await.map_err(|e| {
            warn!("Thread registry not persisted: {}", e);
            e
        })
    }
}
