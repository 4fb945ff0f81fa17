//! Access to the external lexicon/config documents.
//!
//! The gateway treats persistent storage as a collaborator that hands back
//! JSON documents. [`JsonDirStore`] serves them from a directory on disk;
//! [`MemoryStore`] backs tests.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Source of the four lexicon documents.
#[async_trait]
pub trait LexiconStore: Send + Sync {
    /// Per-user overlay document, if the user has one.
    async fn user_document(&self, user_id: &str) -> Result<Option<Value>>;
    /// Shared lexicon: `{category → {canonical → [variants]}}`.
    async fn global_lexicon(&self) -> Result<Value>;
    /// Shared protected words: a flat ordered array of strings.
    async fn protected_words(&self) -> Result<Value>;
    /// Shared pipeline configuration document.
    async fn config(&self) -> Result<Value>;
}

/// Directory-backed store.
///
/// Layout: `global_lexicon.json`, `protected_words.json`, `config.json` and
/// `users/<id>.json` under the configured data directory.
pub struct JsonDirStore {
    data_dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    async fn read_json(&self, name: &str) -> Result<Value> {
        let path = self.data_dir.join(name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| GatewayError::Store(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::Store(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl LexiconStore for JsonDirStore {
    async fn user_document(&self, user_id: &str) -> Result<Option<Value>> {
        // user ids come from requests; keep path traversal out
        if user_id.contains(['/', '\\', '.']) {
            return Err(GatewayError::Validation(format!("bad user id: {user_id}")));
        }
        let path = self.data_dir.join("users").join(format!("{user_id}.json"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| GatewayError::Store(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GatewayError::Store(format!("{}: {e}", path.display()))),
        }
    }

    async fn global_lexicon(&self) -> Result<Value> {
        self.read_json("global_lexicon.json").await
    }

    async fn protected_words(&self) -> Result<Value> {
        self.read_json("protected_words.json").await
    }

    async fn config(&self) -> Result<Value> {
        self.read_json("config.json").await
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    pub users: dashmap::DashMap<String, Value>,
    pub lexicon: std::sync::Mutex<Value>,
    pub protected: std::sync::Mutex<Value>,
    pub config: std::sync::Mutex<Value>,
}

impl MemoryStore {
    pub fn new(lexicon: Value, protected: Value, config: Value) -> Self {
        Self {
            users: dashmap::DashMap::new(),
            lexicon: std::sync::Mutex::new(lexicon),
            protected: std::sync::Mutex::new(protected),
            config: std::sync::Mutex::new(config),
        }
    }

    fn locked(slot: &std::sync::Mutex<Value>) -> Result<Value> {
        slot.lock()
            .map(|v| v.clone())
            .map_err(|_| GatewayError::Internal("lexicon store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LexiconStore for MemoryStore {
    async fn user_document(&self, user_id: &str) -> Result<Option<Value>> {
        Ok(self.users.get(user_id).map(|v| v.clone()))
    }

    async fn global_lexicon(&self) -> Result<Value> {
        Self::locked(&self.lexicon)
    }

    async fn protected_words(&self) -> Result<Value> {
        Self::locked(&self.protected)
    }

    async fn config(&self) -> Result<Value> {
        Self::locked(&self.config)
    }
}
