use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use super::{Store, StoreKey};
use crate::error::AppResult;
use crate::models::{GameCache, IdList};

/// Typed view over a raw [`Store`]
///
/// Reads never fail on bad data: an absent key or a value that does not
/// parse comes back as the empty structure. Backend failures still surface.
#[derive(Clone)]
pub struct PersistedStore {
    backend: Arc<dyn Store>,
}

impl PersistedStore {
    pub fn new(backend: Arc<dyn Store>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn games(&self) -> AppResult<GameCache> {
        self.read_or_default(StoreKey::CachedGames).await
    }

    pub async fn save_games(&self, games: &GameCache) -> AppResult<()> {
        self.write_json(StoreKey::CachedGames, games).await
    }

    pub async fn favorite_ids(&self) -> AppResult<IdList> {
        self.read_or_default(StoreKey::FavoriteIds).await
    }

    pub async fn save_favorite_ids(&self, ids: &IdList) -> AppResult<()> {
        self.write_json(StoreKey::FavoriteIds, ids).await
    }

    pub async fn played_ids(&self) -> AppResult<IdList> {
        self.read_or_default(StoreKey::PlayedIds).await
    }

    pub async fn save_played_ids(&self, ids: &IdList) -> AppResult<()> {
        self.write_json(StoreKey::PlayedIds, ids).await
    }

    /// Drops all three entries
    pub async fn clear_all(&self) -> AppResult<()> {
        self.backend.clear_all(&StoreKey::ALL).await
    }

    async fn read_or_default<T: DeserializeOwned + Default>(&self, key: StoreKey) -> AppResult<T> {
        let Some(raw) = self.backend.read(key).await? else {
            return Ok(T::default());
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    store = self.backend.name(),
                    error = %e,
                    "Corrupted persisted value, using empty default"
                );
                Ok(T::default())
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: StoreKey, value: &T) -> AppResult<()> {
        let json = serde_json::to_string(value)?;
        self.backend.write(key, json).await
    }
}
