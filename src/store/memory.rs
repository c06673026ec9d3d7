//! In-process store. Contents live as long as the process.

use std::sync::Arc;

use dashmap::DashMap;

use super::{Backend, StoreError, StoreHandle, StoreUri, Storage};

pub const NAME: &str = "memory";

/// Memory backend; one store per path.
#[derive(Default)]
pub struct Memory {
    stores: DashMap<String, StoreHandle>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for Memory {
    fn open(&self, path: &str) -> Result<StoreHandle, StoreError> {
        let store = self
            .stores
            .entry(path.to_string())
            .or_insert_with(|| -> StoreHandle {
                Arc::new(MemoryStore {
                    uri: StoreUri::new(NAME, path).to_string(),
                    data: DashMap::new(),
                })
            })
            .value()
            .clone();
        Ok(store)
    }
}

#[derive(Debug)]
struct MemoryStore {
    uri: String,
    data: DashMap<String, String>,
}

impl Storage for MemoryStore {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
