//! MemoryStore - HashMap-backed store for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{Store, StoreKey};
use crate::error::{AppError, AppResult};

/// In-memory store. Clone-friendly via Arc; clones share storage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<StoreKey, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> AppError {
        AppError::Store("lock poisoned".into())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn read(&self, key: StoreKey) -> AppResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(&key).cloned())
    }

    async fn write(&self, key: StoreKey, value: String) -> AppResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(key, value);
        Ok(())
    }

    async fn clear(&self, key: StoreKey) -> AppResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(&key);
        Ok(())
    }

    async fn clear_all(&self, keys: &[StoreKey]) -> AppResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
