use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::errors::StoreError;

/// Byte-oriented key-value backend underneath the document gateway.
///
/// The JSON helpers mirror the `get_json`/`set_json` pair the Spin store offers,
/// so documents are stored the same way regardless of which backend is plugged in.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Serde {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Serde {
            key: key.to_string(),
            source,
        })?;
        self.set(key, &bytes)
    }
}

/// Spin key-value store opened by label.
pub struct SpinKv {
    store: spin_sdk::key_value::Store,
}

impl SpinKv {
    pub fn open(label: &str) -> Result<Self, StoreError> {
        spin_sdk::key_value::Store::open(label)
            .map(|store| Self { store })
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl KvStore for SpinKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.store
            .get(key)
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.store
            .set(key, value)
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store
            .delete(key)
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// Process-local store for the native server and tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_documents_survive_a_store_trip() {
        let kv = MemoryKv::new();
        kv.set_json("feed", &vec!["a".to_string(), "b".to_string()]).unwrap();
        let feed: Option<Vec<String>> = kv.get_json("feed").unwrap();
        assert_eq!(feed, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn missing_and_deleted_keys_read_as_none() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("nope").unwrap(), None);
        kv.set("k", b"v").unwrap();
        kv.delete("k").unwrap();
        assert_eq!(kv.get("k").unwrap(), None);
        // Deleting twice is not an error.
        kv.delete("k").unwrap();
    }

    #[test]
    fn garbage_documents_surface_the_key() {
        let kv = MemoryKv::new();
        kv.set("user:1", b"{not json").unwrap();
        let err = kv.get_json::<Vec<String>>("user:1").unwrap_err();
        assert!(err.to_string().contains("user:1"));
    }
}
