use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::caching::CachingContentStore;
use crate::error::{StoreError, StoreResult};
use crate::file::FileContentStore;
use crate::replicating::ReplicatingContentStore;
use crate::traits::ContentStore;

/// Configuration for a [`FileContentStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Directory that content paths are resolved against.
    pub root: PathBuf,
    /// Reject writers and deletes.
    pub read_only: bool,
    /// `fsync` content files when a writer is closed.
    pub fsync: bool,
}

impl FileStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("contentstore"),
            read_only: false,
            fsync: true,
        }
    }
}

/// Replication behaviour of a [`ReplicatingContentStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Copy content to every secondary when a writer is closed.
    pub outbound: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self { outbound: true }
    }
}

/// Layered store configuration, as loaded from a TOML file.
///
/// ```toml
/// [store]
/// root = "/var/lib/cstore"
///
/// [cache]
/// root = "/tmp/cstore-cache"
///
/// [[replicas]]
/// root = "/mnt/backup/cstore"
///
/// [replication]
/// outbound = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Primary file store.
    pub store: FileStoreConfig,
    /// Optional read cache in front of the primary (and its replicas).
    pub cache: Option<FileStoreConfig>,
    /// Secondary file stores.
    pub replicas: Vec<FileStoreConfig>,
    pub replication: ReplicationConfig,
}

impl StoreConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Render as a TOML document.
    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Open the configured stores and compose them.
    ///
    /// Replicas wrap the primary; the cache, when configured, sits in front
    /// of everything else.
    pub fn open(&self) -> StoreResult<Arc<dyn ContentStore>> {
        let mut store: Arc<dyn ContentStore> = Arc::new(FileContentStore::new(self.store.clone())?);

        if !self.replicas.is_empty() {
            let secondaries = self
                .replicas
                .iter()
                .map(|cfg| {
                    FileContentStore::new(cfg.clone()).map(|s| Arc::new(s) as Arc<dyn ContentStore>)
                })
                .collect::<StoreResult<Vec<_>>>()?;
            store = Arc::new(ReplicatingContentStore::new(
                store,
                secondaries,
                self.replication.clone(),
            ));
        }

        if let Some(cache) = &self.cache {
            let cache = Arc::new(FileContentStore::new(cache.clone())?);
            store = Arc::new(CachingContentStore::new(store, cache));
        }

        Ok(store)
    }
}
