//! Directory-backed store.
//!
//! Keys and values are kept in memory and written through to
//! `<path>/catalog.json` on every put. The file is replaced atomically
//! (write to a temporary sibling, then rename).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use super::{Backend, StoreError, StoreHandle, StoreUri, Storage};

pub const NAME: &str = "localdisk";

const CATALOG_FILE: &str = "catalog.json";

/// Local disk backend; one store per directory.
#[derive(Default)]
pub struct LocalDisk {
    stores: DashMap<String, StoreHandle>,
}

impl LocalDisk {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for LocalDisk {
    fn open(&self, path: &str) -> Result<StoreHandle, StoreError> {
        if let Some(store) = self.stores.get(path) {
            return Ok(Arc::clone(store.value()));
        }

        let store: StoreHandle = Arc::new(LocalStore::open(path)?);
        let store = self
            .stores
            .entry(path.to_string())
            .or_insert(store)
            .value()
            .clone();
        Ok(store)
    }
}

#[derive(Debug)]
struct LocalStore {
    uri: String,
    catalog: PathBuf,
    data: DashMap<String, String>,
    /// Serializes catalog rewrites.
    persist: Mutex<()>,
}

impl LocalStore {
    fn open(dir: &str) -> Result<Self, StoreError> {
        let dir = Path::new(dir);
        fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;

        let catalog = dir.join(CATALOG_FILE);
        let data = DashMap::new();
        if catalog.exists() {
            let file = File::open(&catalog).map_err(|source| io_error(&catalog, source))?;
            let map: BTreeMap<String, String> = serde_json::from_reader(BufReader::new(file))
                .map_err(|source| StoreError::Corrupt {
                    path: catalog.clone(),
                    source,
                })?;
            for (k, v) in map {
                data.insert(k, v);
            }
            tracing::debug!(keys = data.len(), path = %catalog.display(), "Loaded store catalog");
        }

        Ok(Self {
            uri: StoreUri::new(NAME, dir.to_string_lossy()).to_string(),
            catalog,
            data,
            persist: Mutex::new(()),
        })
    }

    /// Rewrite the catalog file. Callers hold `persist`.
    fn save(&self) -> Result<(), StoreError> {
        let map: BTreeMap<String, String> = self
            .data
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let tmp = self.catalog.with_extension("json.tmp");
        let file = File::create(&tmp).map_err(|source| io_error(&tmp, source))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &map).map_err(|source| StoreError::Corrupt {
            path: tmp.clone(),
            source,
        })?;
        writer.flush().map_err(|source| io_error(&tmp, source))?;
        drop(writer);

        fs::rename(&tmp, &self.catalog).map_err(|source| io_error(&self.catalog, source))
    }
}

impl Storage for LocalStore {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    /// Write through to disk. A failed write leaves the previous value.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _lock = self.persist.lock().unwrap_or_else(|e| e.into_inner());

        let previous = self.data.insert(key.to_string(), value.to_string());
        if let Err(e) = self.save() {
            match previous {
                Some(previous) => {
                    self.data.insert(key.to_string(), previous);
                }
                None => {
                    self.data.remove(key);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
