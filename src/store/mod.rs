//! Storage backend provisioning.
//!
//! # Data Flow
//! ```text
//! "name" + "path"
//!     → StoreUri ("name://path")
//!     → StoreRegistry (backend lookup by name)
//!     → Backend::open (cached per path)
//!     → StoreHandle (shared by session domain and server driver)
//! ```
//!
//! # Design Decisions
//! - Backends register by name; unknown names are fatal and list the known ones
//! - Handles are never closed explicitly; process exit reclaims them
//! - A backend hands out the same handle for the same path

pub mod local;
pub mod memory;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

pub use local::LocalDisk;
pub use memory::Memory;

/// Shared reference to an opened store.
pub type StoreHandle = Arc<dyn Storage>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown store backend {name:?} (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("invalid store uri {0:?}")]
    InvalidUri(String),

    #[error("store I/O failed at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store catalog at {} is corrupt", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Key/value view of a storage backend.
pub trait Storage: Send + Sync + fmt::Debug {
    /// URI this store was opened with.
    fn uri(&self) -> &str;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// A named storage driver.
pub trait Backend: Send + Sync {
    fn open(&self, path: &str) -> Result<StoreHandle, StoreError>;
}

/// Backend name and path, written `name://path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUri {
    pub backend: String,
    pub path: String,
}

impl StoreUri {
    pub fn new(backend: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            path: path.into(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        match uri.split_once("://") {
            Some((backend, path)) if !backend.is_empty() => Ok(Self::new(backend, path)),
            _ => Err(StoreError::InvalidUri(uri.to_string())),
        }
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.backend, self.path)
    }
}

/// Registry of named backends.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    backends: Arc<DashMap<String, Arc<dyn Backend>>>,
}

impl StoreRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `memory` and `localdisk` backends.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(memory::NAME, Arc::new(Memory::new()));
        registry.register(local::NAME, Arc::new(LocalDisk::new()));
        registry
    }

    /// Register (or replace) a backend under `name`.
    pub fn register(&self, name: &str, backend: Arc<dyn Backend>) {
        self.backends.insert(name.to_ascii_lowercase(), backend);
    }

    /// Sorted names of every registered backend.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Open the store addressed by `uri`.
    pub fn open(&self, uri: &StoreUri) -> Result<StoreHandle, StoreError> {
        let backend = self
            .backends
            .get(&uri.backend.to_ascii_lowercase())
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| StoreError::UnknownBackend {
                name: uri.backend.clone(),
                available: self.names().join(", "),
            })?;

        let store = backend.open(&uri.path)?;
        tracing::info!(uri = %uri, "Store opened");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_round_trips_through_display() {
        let uri = StoreUri::parse("localdisk:///tmp/dbserver").unwrap();
        assert_eq!(uri, StoreUri::new("localdisk", "/tmp/dbserver"));
        assert_eq!(uri.to_string(), "localdisk:///tmp/dbserver");
    }

    #[test]
    fn uri_requires_backend_name() {
        assert!(StoreUri::parse("/tmp/dbserver").is_err());
        assert!(StoreUri::parse("://x").is_err());
    }

    #[test]
    fn unknown_backend_lists_available() {
        let registry = StoreRegistry::with_builtin();
        let err = registry.open(&StoreUri::new("goleveldb", "/tmp/x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown store backend \"goleveldb\" (available: localdisk, memory)"
        );
    }

    #[test]
    fn backend_names_are_case_insensitive() {
        let registry = StoreRegistry::with_builtin();
        let store = registry.open(&StoreUri::new("Memory", "case")).unwrap();
        assert_eq!(store.uri(), "memory://case");
    }
}
