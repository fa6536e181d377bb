//! Key-value persistence media.

use facegate_core::StoreError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Read-modify-write callback: receives the current value (if any) and
/// returns the replacement. Returning an error aborts the write.
pub type Edit<'a> = dyn FnMut(Option<String>) -> Result<String, StoreError> + 'a;

/// A durable string store addressed by key.
///
/// `modify` must run as one atomic unit: other writers never observe a
/// half-applied edit, and an edit that fails leaves the old value in place.
pub trait KvMedium {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn modify(&self, key: &str, edit: &mut Edit<'_>) -> Result<(), StoreError>;
}

/// Process-local medium. Writers are serialised by a mutex.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a raw value under `key`, bypassing any codec.
    pub fn insert_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Backend("memory medium lock poisoned".into()))
    }
}

impl KvMedium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn modify(&self, key: &str, edit: &mut Edit<'_>) -> Result<(), StoreError> {
        let mut values = self.lock()?;
        let next = edit(values.get(key).cloned())?;
        values.insert(key.to_string(), next);
        Ok(())
    }
}
