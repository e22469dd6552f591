//! Process-wide key/value state: the last applied thread filter, the watch
//! request list, and the views' serialised HTML.
//!
//! Records are plain JSON without schema versioning. A missing or malformed
//! record reads as the default value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lanescope_protocol::ViewKind;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub const THREAD_FILTER_KEY: &str = "threadFilter";
pub const WATCH_REQUESTS_KEY: &str = "simdWatchRequests";

/// Key under which a view's serialised HTML is kept.
pub fn html_state_key(view: ViewKind) -> String {
    format!("htmlState.{}", view.as_str())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialize {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub trait StateStore {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Read a typed record, falling back to the default when it is missing or
/// does not match the expected shape.
pub fn load_or_default<T, St>(store: &St, key: &str) -> T
where
    T: DeserializeOwned + Default,
    St: StateStore + ?Sized,
{
    let Some(value) = store.get(key) else {
        return T::default();
    };
    match serde_json::from_value(value) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(key, %err, "ignoring malformed state record");
            T::default()
        }
    }
}

pub fn save<T, St>(store: &St, key: &str, record: &T) -> Result<(), StoreError>
where
    T: Serialize,
    St: StateStore + ?Sized,
{
    let value = serde_json::to_value(record).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value)
}

/// Volatile store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// A store backed by one JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<serde_json::Map<String, Value>>,
}

impl JsonFileStore {
    /// Open `path`. An unreadable or malformed file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = std::fs::read(&path)
            .ok()
            .and_then(|bytes| match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => Some(map),
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %path.display(), "state file is not a JSON object, starting empty");
                    None
                }
            })
            .unwrap_or_default();
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value);
        let bytes = serde_json::to_vec_pretty(&*values).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        std::fs::write(&self.path, bytes).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
