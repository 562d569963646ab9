//! Durable key-value persistence for the collection.
//!
//! Three independent entries are stored, each a JSON document: the cached
//! game records, the favorited id list and the played id list. Backends
//! only move strings around; [`PersistedStore`] owns (de)serialization and
//! the "absent or corrupt reads as empty" rule.

use std::fmt::Display;

use crate::error::AppResult;

mod file;
mod memory;
mod persisted;
mod redis_store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use persisted::PersistedStore;
pub use redis_store::{create_redis_client, RedisStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    CachedGames,
    FavoriteIds,
    PlayedIds,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [
        StoreKey::CachedGames,
        StoreKey::FavoriteIds,
        StoreKey::PlayedIds,
    ];
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::CachedGames => write!(f, "localGames"),
            StoreKey::FavoriteIds => write!(f, "favoriteGameIds"),
            StoreKey::PlayedIds => write!(f, "playedGameIds"),
        }
    }
}

/// Raw key-value backend
///
/// No transactions span keys; callers order their writes. Implementations
/// that can drop several keys in one step should override [`Store::clear_all`].
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Returns the stored value, or `None` when the key was never written
    async fn read(&self, key: StoreKey) -> AppResult<Option<String>>;

    async fn write(&self, key: StoreKey, value: String) -> AppResult<()>;

    /// Removes the key. Clearing an absent key is not an error.
    async fn clear(&self, key: StoreKey) -> AppResult<()>;

    async fn clear_all(&self, keys: &[StoreKey]) -> AppResult<()> {
        for key in keys {
            self.clear(*key).await?;
        }
        Ok(())
    }

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
