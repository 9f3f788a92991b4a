//! Durable storage behind the thread registry.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{ChannelId, ConversationId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Complete registry contents, ordered so snapshots diff cleanly.
pub type Snapshot = BTreeMap<ChannelId, ConversationId>;

/// Where registry snapshots live.
///
/// `save` always receives the whole mapping; implementations must make the
/// new snapshot visible all at once or not at all.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Loads the last saved snapshot. Missing or unreadable data is an empty
    /// registry, never an error.
    async fn load(&self) -> Snapshot;

    /// Replaces the stored snapshot.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), EngineError>;
}

/// Snapshot kept in a single JSON object file: `{"<channel>": "<thread>"}`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "threads.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Snapshot {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No registry file at {}, starting empty", self.path.display());
                return Snapshot::new();
            }
            Err(e) => {
                error!(
                    "Failed to read registry file {}: {}",
                    self.path.display(),
                    e
                );
                return Snapshot::new();
            }
        };

        if contents.trim().is_empty() {
            return Snapshot::new();
        }

        match serde_json::from_str::<Snapshot>(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Registry file {} is corrupt ({}); it will be replaced on the next bind",
                    self.path.display(),
                    e
                );
                Snapshot::new()
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), EngineError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| EngineError::Persistence(format!("Failed to encode registry: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    EngineError::Persistence(format!(
                        "Failed to create registry directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        // Readers only ever see the old file or the new one.
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await.map_err(|e| {
            EngineError::Persistence(format!("Failed to write {}: {}", temp.display(), e))
        })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(
            "Saved {} thread mapping(s) to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}
