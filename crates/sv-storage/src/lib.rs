use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Durable (`localStorage`) keys.
pub mod keys {
    pub const THEME_CACHE: &str = "sv_theme_cache";
    pub const AUTH_SESSION: &str = "sv_auth_session";
    pub const LEGACY_AUTH_TOKEN: &str = "auth_token";
    pub const LEGACY_AUTH_USER: &str = "user";
    pub const VERIFICATION_DISMISSED_UNTIL: &str = "sv_verification_dismissed_until";
}

/// Session-scoped (`sessionStorage`) keys.
pub mod session_keys {
    pub const WEBVIEW_SOURCE: &str = "sv_webview_source";
    pub const NATIVE_TOKEN: &str = "sv_native_token";
    pub const RETURN_URL: &str = "sv_return_url";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Synchronous string key/value storage. Browser storage can throw on any
/// access (private mode, quota, disabled cookies), so every call is fallible.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RefCell<HashMap<String, String>>,
    unavailable: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every access fails, like a disabled browser backend.
    pub fn unavailable() -> Self {
        Self {
            entries: RefCell::default(),
            unavailable: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable("in-memory store disabled".to_owned()));
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.borrow_mut().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn write_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

// ── Soft helpers: storage failures degrade to "nothing stored" ──

pub fn soft_get(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(err) => {
            warn!(key, "storage read failed: {err}");
            None
        }
    }
}

pub fn soft_set(store: &dyn KeyValueStore, key: &str, value: &str) -> bool {
    match store.set(key, value) {
        Ok(()) => true,
        Err(err) => {
            warn!(key, "storage write failed: {err}");
            false
        }
    }
}

pub fn soft_remove(store: &dyn KeyValueStore, key: &str) -> bool {
    match store.remove(key) {
        Ok(()) => true,
        Err(err) => {
            warn!(key, "storage remove failed: {err}");
            false
        }
    }
}

/// Typed read that also treats a corrupt entry as absent.
pub fn soft_read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match read_json(store, key) {
        Ok(value) => value,
        Err(err) => {
            warn!(key, "ignoring stored value: {err}");
            None
        }
    }
}

pub fn soft_write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    match write_json(store, key, value) {
        Ok(()) => true,
        Err(err) => {
            warn!(key, "storage write failed: {err}");
            false
        }
    }
}

/// Read and delete in one step. The value is returned even if the delete fails.
pub fn soft_take(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    let value = soft_get(store, key)?;
    soft_remove(store, key);
    Some(value)
}
