//! Persisted session storage
//!
//! The orchestration layer treats storage as an opaque key-value store. Only
//! three string fields are persisted (see [`StorageKeys`]).

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::StorageKeys;

/// Opaque key-value store backing the persisted session
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// Process-local storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.lock().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// The persisted session triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub username: String,
    pub token: String,
    /// Epoch seconds
    pub expires: i64,
}

impl SessionRecord {
    /// Read the record; `None` when any field is missing or unreadable
    pub fn load(storage: &dyn SessionStorage, keys: &StorageKeys) -> Option<Self> {
        let username = storage.get(&keys.username).filter(|v| !v.is_empty())?;
        let token = storage.get(&keys.token).filter(|v| !v.is_empty())?;
        let raw_expires = storage.get(&keys.expires)?;

        match raw_expires.trim().parse::<i64>() {
            Ok(expires) => Some(Self {
                username,
                token,
                expires,
            }),
            Err(_) => {
                warn!(value = %raw_expires, "Ignoring persisted session with unreadable expiry");
                None
            }
        }
    }

    pub fn save(&self, storage: &dyn SessionStorage, keys: &StorageKeys) {
        storage.set(&keys.username, self.username.clone());
        storage.set(&keys.token, self.token.clone());
        storage.set(&keys.expires, self.expires.to_string());
    }

    pub fn clear(storage: &dyn SessionStorage, keys: &StorageKeys) {
        storage.remove(&keys.token);
        storage.remove(&keys.username);
        storage.remove(&keys.expires);
    }
}
