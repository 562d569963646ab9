//! Favorited/played collection backed by a [`PersistedStore`].
//!
//! Three structures are persisted independently: the record cache, the
//! favorited ids and the played ids. After every mutation a game is cached
//! exactly when at least one of the two sets references it.
//!
//! Write order matters because the store has no cross-key transactions:
//! records are cached before an id joins a set, and a set is saved before
//! its record is evicted. An interruption can therefore only leave an
//! orphaned record behind (cleaned up by [`CollectionManager::prune_orphans`]),
//! never a set member without its record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::{
    error::{AppError, AppResult},
    models::{CollectionCounts, GameCache, GameRecord, GameState, IdList, Transition},
    services::catalog::CatalogClient,
    store::PersistedStore,
};

/// What happens to an already-cached payload when the game is added again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// The first cached payload is kept
    #[default]
    KeepFirst,
    /// A record supplied by the caller or fetched from the catalog replaces it
    RefreshOnAdd,
}

/// Where a resolved record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    Cache,
    Caller,
    Catalog,
}

/// Output of [`CollectionManager::resolve_record`], input of
/// [`CollectionManager::apply_played`]
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub record: GameRecord,
    pub source: RecordSource,
}

pub struct CollectionManager {
    store: PersistedStore,
    catalog: Arc<dyn CatalogClient>,
    policy: CachePolicy,
    /// Mutations hold the write side across their whole read-modify-write;
    /// views hold the read side. Never held across a catalog call.
    guard: RwLock<()>,
    seed_revision: watch::Sender<u64>,
}

fn usable_id(id: &str) -> Option<&str> {
    if id.trim().is_empty() {
        None
    } else {
        Some(id)
    }
}

fn union_ids(favorites: &IdList, played: &IdList) -> IdList {
    favorites.iter().chain(played.iter()).cloned().collect()
}

fn resolve_ids<'a>(games: &GameCache, ids: impl Iterator<Item = &'a String>) -> Vec<GameRecord> {
    ids.filter_map(|id| games.get(id).cloned()).collect()
}

impl CollectionManager {
    pub fn new(store: PersistedStore, catalog: Arc<dyn CatalogClient>, policy: CachePolicy) -> Self {
        let (seed_revision, _) = watch::channel(0);
        Self {
            store,
            catalog,
            policy,
            guard: RwLock::new(()),
            seed_revision,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Receiver that ticks whenever the favorited or played membership changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.seed_revision.subscribe()
    }

    fn bump_seed(&self) {
        self.seed_revision.send_modify(|revision| *revision += 1);
    }

    fn needs_cache_write(&self, games: &GameCache, resolved: &ResolvedRecord) -> bool {
        match games.get(&resolved.record.id) {
            None => true,
            Some(existing) => {
                self.policy == CachePolicy::RefreshOnAdd
                    && resolved.source != RecordSource::Cache
                    && existing != &resolved.record
            }
        }
    }

    /// Favorites a game, caching its record first
    pub async fn add_favorite(&self, record: GameRecord) -> AppResult<Transition> {
        if !record.has_id() {
            tracing::warn!("Ignoring favorite for a game without an id");
            return Ok(Transition::unchanged(&record.id, GameState::Unknown));
        }

        let _guard = self.guard.write().await;
        let id = record.id.clone();
        let mut games = self.store.games().await?;
        let mut favorites = self.store.favorite_ids().await?;
        let played = self.store.played_ids().await?;
        let from = GameState::from_membership(favorites.contains(&id), played.contains(&id));

        let resolved = ResolvedRecord {
            record,
            source: RecordSource::Caller,
        };
        if self.needs_cache_write(&games, &resolved) {
            games.insert(id.clone(), resolved.record);
            self.store.save_games(&games).await?;
        }

        if favorites.insert(&id) {
            self.store.save_favorite_ids(&favorites).await?;
            self.bump_seed();
        }

        let to = GameState::from_membership(true, played.contains(&id));
        tracing::info!(game_id = %id, from = %from, to = %to, "Game favorited");
        Ok(Transition::new(&id, from, to))
    }

    /// Unfavorites a game, evicting its record if nothing else references it
    pub async fn remove_favorite(&self, id: &str) -> AppResult<Transition> {
        let Some(id) = usable_id(id) else {
            tracing::warn!("Ignoring unfavorite without an id");
            return Ok(Transition::unchanged(id, GameState::Unknown));
        };

        let _guard = self.guard.write().await;
        let mut favorites = self.store.favorite_ids().await?;
        let played = self.store.played_ids().await?;
        let from = GameState::from_membership(favorites.contains(id), played.contains(id));

        if favorites.remove(id) {
            self.store.save_favorite_ids(&favorites).await?;
            self.bump_seed();
        }
        self.evict_if_unreferenced(id, &favorites, &played).await?;

        let to = GameState::from_membership(false, played.contains(id));
        tracing::info!(game_id = %id, from = %from, to = %to, "Game unfavorited");
        Ok(Transition::new(id, from, to))
    }

    /// Marks a game as played
    ///
    /// When the game is not cached and no matching record is supplied, the
    /// record is fetched from the catalog first; the played set is only
    /// touched once a record is in hand. A failed fetch is returned to the
    /// caller and nothing changes.
    pub async fn mark_played(&self, id: &str, known: Option<GameRecord>) -> AppResult<Transition> {
        let Some(id) = usable_id(id) else {
            tracing::warn!("Ignoring mark-played without an id");
            return Ok(Transition::unchanged(id, GameState::Unknown));
        };

        let resolved = self.resolve_record(id, known).await?;
        self.apply_played(resolved).await
    }

    /// First half of mark-played: find a record for `id`
    ///
    /// Prefers a caller-supplied record with a matching id, then the cache,
    /// then the catalog.
    pub async fn resolve_record(
        &self,
        id: &str,
        known: Option<GameRecord>,
    ) -> AppResult<ResolvedRecord> {
        if let Some(record) = known {
            if record.id == id {
                return Ok(ResolvedRecord {
                    record,
                    source: RecordSource::Caller,
                });
            }
            tracing::warn!(
                game_id = %id,
                supplied_id = %record.id,
                "Supplied record does not match, ignoring it"
            );
        }

        if let Some(record) = self.cached_record(id).await? {
            return Ok(ResolvedRecord {
                record,
                source: RecordSource::Cache,
            });
        }

        tracing::info!(game_id = %id, "Game not cached, fetching from catalog");
        match self.catalog.get_game(id).await {
            Ok(record) if record.id == id => Ok(ResolvedRecord {
                record,
                source: RecordSource::Catalog,
            }),
            Ok(record) => Err(AppError::ExternalApi(format!(
                "Catalog returned game '{}' for id '{}'",
                record.id, id
            ))),
            Err(e) => {
                tracing::warn!(game_id = %id, error = %e, "Fetch failed, mark-played abandoned");
                Err(e)
            }
        }
    }

    /// Second half of mark-played: cache the record and join the played set
    pub async fn apply_played(&self, resolved: ResolvedRecord) -> AppResult<Transition> {
        if !resolved.record.has_id() {
            tracing::warn!("Ignoring played record without an id");
            return Ok(Transition::unchanged(&resolved.record.id, GameState::Unknown));
        }

        let _guard = self.guard.write().await;
        let id = resolved.record.id.clone();
        let mut games = self.store.games().await?;
        let favorites = self.store.favorite_ids().await?;
        let mut played = self.store.played_ids().await?;
        let from = GameState::from_membership(favorites.contains(&id), played.contains(&id));

        // A cache-sourced record may have been evicted since it was resolved;
        // this puts it back.
        if self.needs_cache_write(&games, &resolved) {
            games.insert(id.clone(), resolved.record);
            self.store.save_games(&games).await?;
        }

        if played.insert(&id) {
            self.store.save_played_ids(&played).await?;
            self.bump_seed();
        }

        let to = GameState::from_membership(favorites.contains(&id), true);
        tracing::info!(game_id = %id, from = %from, to = %to, "Game marked played");
        Ok(Transition::new(&id, from, to))
    }

    /// Removes a game from the played set, evicting its record if unreferenced
    pub async fn mark_unplayed(&self, id: &str) -> AppResult<Transition> {
        let Some(id) = usable_id(id) else {
            tracing::warn!("Ignoring mark-unplayed without an id");
            return Ok(Transition::unchanged(id, GameState::Unknown));
        };

        let _guard = self.guard.write().await;
        let favorites = self.store.favorite_ids().await?;
        let mut played = self.store.played_ids().await?;
        let from = GameState::from_membership(favorites.contains(id), played.contains(id));

        if played.remove(id) {
            self.store.save_played_ids(&played).await?;
            self.bump_seed();
        }
        self.evict_if_unreferenced(id, &favorites, &played).await?;

        let to = GameState::from_membership(favorites.contains(id), false);
        tracing::info!(game_id = %id, from = %from, to = %to, "Game marked unplayed");
        Ok(Transition::new(id, from, to))
    }

    /// Empties the cache and both sets in one step
    pub async fn clear_all(&self) -> AppResult<()> {
        let _guard = self.guard.write().await;
        let had_members = !self.store.favorite_ids().await?.is_empty()
            || !self.store.played_ids().await?.is_empty();

        self.store.clear_all().await?;

        if had_members {
            self.bump_seed();
        }
        tracing::info!("Collection cleared");
        Ok(())
    }

    /// Drops cached records no set references. Returns how many were dropped.
    ///
    /// Set members without a cached record are reported but kept: the
    /// membership is the user's data, the record can be fetched again.
    pub async fn prune_orphans(&self) -> AppResult<usize> {
        let _guard = self.guard.write().await;
        let mut games = self.store.games().await?;
        let favorites = self.store.favorite_ids().await?;
        let played = self.store.played_ids().await?;

        let before = games.len();
        games.retain(|id, _| favorites.contains(id) || played.contains(id));
        let pruned = before - games.len();
        if pruned > 0 {
            self.store.save_games(&games).await?;
        }

        let dangling = union_ids(&favorites, &played)
            .iter()
            .filter(|id| !games.contains_key(*id))
            .count();
        if dangling > 0 {
            tracing::warn!(dangling, "Collection references games with no cached record");
        }

        tracing::info!(pruned, store = self.store.backend_name(), "Orphaned records pruned");
        Ok(pruned)
    }

    /// Caller must hold the write guard
    async fn evict_if_unreferenced(
        &self,
        id: &str,
        favorites: &IdList,
        played: &IdList,
    ) -> AppResult<()> {
        if favorites.contains(id) || played.contains(id) {
            return Ok(());
        }

        let mut games = self.store.games().await?;
        if games.remove(id).is_some() {
            self.store.save_games(&games).await?;
            tracing::debug!(game_id = %id, "Evicted unreferenced record");
        }
        Ok(())
    }

    async fn cached_record(&self, id: &str) -> AppResult<Option<GameRecord>> {
        let _guard = self.guard.read().await;
        let mut games = self.store.games().await?;
        Ok(games.remove(id))
    }

    pub async fn state_of(&self, id: &str) -> AppResult<GameState> {
        let _guard = self.guard.read().await;
        let favorites = self.store.favorite_ids().await?;
        let played = self.store.played_ids().await?;
        Ok(GameState::from_membership(
            favorites.contains(id),
            played.contains(id),
        ))
    }

    /// Every favorited or played game, favorites first, each exactly once
    ///
    /// Ids without a cached record are skipped.
    pub async fn combined_view(&self) -> AppResult<Vec<GameRecord>> {
        let _guard = self.guard.read().await;
        let games = self.store.games().await?;
        let ids = union_ids(
            &self.store.favorite_ids().await?,
            &self.store.played_ids().await?,
        );
        Ok(resolve_ids(&games, ids.iter()))
    }

    pub async fn favorite_games(&self) -> AppResult<Vec<GameRecord>> {
        let _guard = self.guard.read().await;
        let games = self.store.games().await?;
        let favorites = self.store.favorite_ids().await?;
        Ok(resolve_ids(&games, favorites.iter()))
    }

    pub async fn played_games(&self) -> AppResult<Vec<GameRecord>> {
        let _guard = self.guard.read().await;
        let games = self.store.games().await?;
        let played = self.store.played_ids().await?;
        Ok(resolve_ids(&games, played.iter()))
    }

    pub async fn favorite_ids(&self) -> AppResult<Vec<String>> {
        let _guard = self.guard.read().await;
        Ok(self.store.favorite_ids().await?.into_vec())
    }

    pub async fn played_ids(&self) -> AppResult<Vec<String>> {
        let _guard = self.guard.read().await;
        Ok(self.store.played_ids().await?.into_vec())
    }

    /// Played ids as a lookup map (`{"g1": true}`)
    pub async fn played_status(&self) -> AppResult<HashMap<String, bool>> {
        let played = self.played_ids().await?;
        Ok(played.into_iter().map(|id| (id, true)).collect())
    }

    /// Union of favorited and played ids, the recommendation seed
    pub async fn seed_ids(&self) -> AppResult<Vec<String>> {
        let _guard = self.guard.read().await;
        let favorites = self.store.favorite_ids().await?;
        let played = self.store.played_ids().await?;
        Ok(union_ids(&favorites, &played).into_vec())
    }

    pub async fn counts(&self) -> AppResult<CollectionCounts> {
        let _guard = self.guard.read().await;
        let favorites = self.store.favorite_ids().await?;
        let played = self.store.played_ids().await?;
        Ok(CollectionCounts {
            favorited: favorites.len(),
            played: played.len(),
            total: union_ids(&favorites, &played).len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::MockCatalogClient;
    use crate::store::{MemoryStore, Store, StoreKey};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    fn game(id: &str, name: &str) -> GameRecord {
        GameRecord::new(id).with_field("name", name)
    }

    fn manager_with(catalog: MockCatalogClient, policy: CachePolicy) -> (CollectionManager, MemoryStore) {
        let raw = MemoryStore::new();
        let store = PersistedStore::new(Arc::new(raw.clone()));
        (CollectionManager::new(store, Arc::new(catalog), policy), raw)
    }

    fn manager() -> (CollectionManager, MemoryStore) {
        let mut catalog = MockCatalogClient::new();
        catalog.expect_get_game().never();
        manager_with(catalog, CachePolicy::KeepFirst)
    }

    /// id ∈ cache ⟺ id ∈ favorites ∨ id ∈ played
    async fn assert_consistent(manager: &CollectionManager) {
        let games = manager.store.games().await.unwrap();
        let favorites = manager.store.favorite_ids().await.unwrap();
        let played = manager.store.played_ids().await.unwrap();

        for id in games.keys() {
            assert!(
                favorites.contains(id) || played.contains(id),
                "orphaned record {id}"
            );
        }
        for id in favorites.iter().chain(played.iter()) {
            assert!(games.contains_key(id), "missing record for {id}");
        }
    }

    #[tokio::test]
    async fn test_add_favorite_caches_record() {
        let (manager, _) = manager();

        let transition = manager.add_favorite(game("g1", "Foo")).await.unwrap();

        assert_eq!(transition.from, GameState::Unknown);
        assert_eq!(transition.to, GameState::FavoritedOnly);
        assert_eq!(manager.favorite_ids().await.unwrap(), vec!["g1"]);
        assert_eq!(manager.favorite_games().await.unwrap()[0].name(), Some("Foo"));
        assert_consistent(&manager).await;
    }

    #[tokio::test]
    async fn test_add_favorite_is_idempotent() {
        let (manager, _) = manager();
        manager.add_favorite(game("g1", "Foo")).await.unwrap();
        let games_once = manager.store.games().await.unwrap();

        let transition = manager.add_favorite(game("g1", "Foo")).await.unwrap();

        assert!(!transition.changed());
        assert_eq!(manager.favorite_ids().await.unwrap(), vec!["g1"]);
        assert_eq!(manager.store.games().await.unwrap(), games_once);
    }

    #[tokio::test]
    async fn test_add_then_remove_restores_empty_state() {
        let (manager, raw) = manager();
        manager.add_favorite(game("g1", "Foo")).await.unwrap();

        let transition = manager.remove_favorite("g1").await.unwrap();

        assert_eq!(transition.to, GameState::Unknown);
        assert!(manager.favorite_ids().await.unwrap().is_empty());
        assert!(manager.store.games().await.unwrap().is_empty());
        assert_eq!(
            raw.read(StoreKey::CachedGames).await.unwrap().as_deref(),
            Some("{}")
        );
    }

    #[tokio::test]
    async fn test_remove_never_favorited_is_noop() {
        let (manager, _) = manager();
        manager
            .mark_played("g1", Some(game("g1", "Foo")))
            .await
            .unwrap();

        let transition = manager.remove_favorite("g1").await.unwrap();

        assert!(!transition.changed());
        assert_eq!(transition.to, GameState::PlayedOnly);
        assert_eq!(manager.combined_view().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_ids_are_noops() {
        let (manager, _) = manager();

        let added = manager.add_favorite(GameRecord::new("")).await.unwrap();
        let removed = manager.remove_favorite("  ").await.unwrap();
        let played = manager.mark_played("", None).await.unwrap();
        let unplayed = manager.mark_unplayed("").await.unwrap();

        for transition in [added, removed, played, unplayed] {
            assert!(!transition.changed());
        }
        assert_eq!(manager.counts().await.unwrap(), CollectionCounts::default());
    }

    #[tokio::test]
    async fn test_mark_played_with_known_record_skips_fetch() {
        let (manager, _) = manager();

        let transition = manager
            .mark_played("g1", Some(game("g1", "Foo")))
            .await
            .unwrap();

        assert_eq!(transition.to, GameState::PlayedOnly);
        assert_eq!(manager.played_status().await.unwrap().get("g1"), Some(&true));
        assert_consistent(&manager).await;
    }

    #[tokio::test]
    async fn test_mark_played_fetches_uncached_game() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_get_game()
            .times(1)
            .returning(|id| Ok(GameRecord::new(id).with_field("name", "Foo")));
        let (manager, _) = manager_with(catalog, CachePolicy::KeepFirst);

        let transition = assert_ok!(manager.mark_played("g1", None).await);

        assert_eq!(transition.to, GameState::PlayedOnly);
        assert_eq!(manager.played_ids().await.unwrap(), vec!["g1"]);
        let games = manager.store.games().await.unwrap();
        assert_eq!(games["g1"].name(), Some("Foo"));
    }

    #[tokio::test]
    async fn test_mark_played_fetch_failure_changes_nothing() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_get_game()
            .times(1)
            .returning(|id| Err(AppError::NotFound(format!("Game with id '{}' not found", id))));
        let (manager, _) = manager_with(catalog, CachePolicy::KeepFirst);

        let result = manager.mark_played("g1", None).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(manager.played_ids().await.unwrap().is_empty());
        assert!(manager.store.games().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_played_rejects_mismatched_fetch() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_get_game()
            .returning(|_| Ok(GameRecord::new("other")));
        let (manager, _) = manager_with(catalog, CachePolicy::KeepFirst);

        assert_err!(manager.mark_played("g1", None).await);
        assert!(manager.seed_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_known_record_falls_back_to_fetch() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_get_game()
            .times(1)
            .returning(|id| Ok(GameRecord::new(id).with_field("name", "Fetched")));
        let (manager, _) = manager_with(catalog, CachePolicy::KeepFirst);

        manager
            .mark_played("g1", Some(game("g2", "Wrong")))
            .await
            .unwrap();

        let games = manager.store.games().await.unwrap();
        assert_eq!(games["g1"].name(), Some("Fetched"));
        assert!(!games.contains_key("g2"));
    }

    #[tokio::test]
    async fn test_mark_played_uses_cached_favorite() {
        let (manager, _) = manager();
        manager.add_favorite(game("g1", "Foo")).await.unwrap();

        let transition = manager.mark_played("g1", None).await.unwrap();

        assert_eq!(transition.from, GameState::FavoritedOnly);
        assert_eq!(transition.to, GameState::Both);
    }

    #[tokio::test]
    async fn test_removal_order_independence() {
        let (first, _) = manager();
        first.add_favorite(game("g1", "Foo")).await.unwrap();
        first.mark_played("g1", None).await.unwrap();
        first.remove_favorite("g1").await.unwrap();

        let (second, _) = manager();
        second
            .mark_played("g1", Some(game("g1", "Foo")))
            .await
            .unwrap();
        second.add_favorite(game("g1", "Foo")).await.unwrap();
        second.remove_favorite("g1").await.unwrap();

        for manager in [&first, &second] {
            assert_eq!(manager.state_of("g1").await.unwrap(), GameState::PlayedOnly);
            assert!(manager.store.games().await.unwrap().contains_key("g1"));
            assert_consistent(manager).await;
        }
    }

    #[tokio::test]
    async fn test_state_machine_walk() {
        let (manager, _) = manager();

        let steps = [
            manager.add_favorite(game("g1", "Foo")).await.unwrap(),
            manager.mark_played("g1", None).await.unwrap(),
            manager.mark_unplayed("g1").await.unwrap(),
            manager.mark_played("g1", None).await.unwrap(),
            manager.remove_favorite("g1").await.unwrap(),
            manager.mark_unplayed("g1").await.unwrap(),
        ];

        let walked: Vec<(GameState, GameState)> = steps.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            walked,
            vec![
                (GameState::Unknown, GameState::FavoritedOnly),
                (GameState::FavoritedOnly, GameState::Both),
                (GameState::Both, GameState::FavoritedOnly),
                (GameState::FavoritedOnly, GameState::Both),
                (GameState::Both, GameState::PlayedOnly),
                (GameState::PlayedOnly, GameState::Unknown),
            ]
        );
        assert!(manager.store.games().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_combined_view_lists_each_game_once() {
        for favorite_first in [true, false] {
            let (manager, _) = manager();
            if favorite_first {
                manager.add_favorite(game("g1", "Foo")).await.unwrap();
                manager.mark_played("g2", Some(game("g2", "Bar"))).await.unwrap();
            } else {
                manager.mark_played("g2", Some(game("g2", "Bar"))).await.unwrap();
                manager.add_favorite(game("g1", "Foo")).await.unwrap();
            }
            manager.mark_played("g1", None).await.unwrap();

            let view = manager.combined_view().await.unwrap();
            let ids: HashSet<&str> = view.iter().map(|g| g.id.as_str()).collect();
            assert_eq!(view.len(), 2);
            assert_eq!(ids, HashSet::from(["g1", "g2"]));
        }
    }

    #[tokio::test]
    async fn test_combined_view_skips_dangling_ids() {
        let (manager, raw) = manager();
        manager.add_favorite(game("g1", "Foo")).await.unwrap();
        raw.write(StoreKey::PlayedIds, r#"["ghost"]"#.to_string())
            .await
            .unwrap();

        let view = manager.combined_view().await.unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "g1");
    }

    #[tokio::test]
    async fn test_clear_all_on_empty_store() {
        let (manager, _) = manager();
        assert_ok!(manager.clear_all().await);
        assert_eq!(manager.counts().await.unwrap(), CollectionCounts::default());
        assert!(manager.store.games().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_empties_everything() {
        let (manager, raw) = manager();
        manager.add_favorite(game("g1", "Foo")).await.unwrap();
        manager.mark_played("g2", Some(game("g2", "Bar"))).await.unwrap();

        manager.clear_all().await.unwrap();

        for key in StoreKey::ALL {
            assert_eq!(raw.read(key).await.unwrap(), None);
        }
        assert!(manager.combined_view().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_orphans_drops_unreferenced_records() {
        let (manager, raw) = manager();
        manager.add_favorite(game("g1", "Foo")).await.unwrap();
        raw.write(
            StoreKey::CachedGames,
            r#"{"g1": {"id": "g1", "name": "Foo"}, "g9": {"id": "g9"}}"#.to_string(),
        )
        .await
        .unwrap();

        let pruned = manager.prune_orphans().await.unwrap();

        assert_eq!(pruned, 1);
        assert_consistent(&manager).await;
    }

    #[tokio::test]
    async fn test_prune_keeps_dangling_membership() {
        let (manager, raw) = manager();
        raw.write(StoreKey::FavoriteIds, r#"["ghost"]"#.to_string())
            .await
            .unwrap();

        assert_eq!(manager.prune_orphans().await.unwrap(), 0);
        assert_eq!(manager.favorite_ids().await.unwrap(), vec!["ghost"]);
    }

    #[tokio::test]
    async fn test_keep_first_policy_does_not_overwrite() {
        let (manager, _) = manager();
        manager.add_favorite(game("g1", "Old")).await.unwrap();
        manager.mark_played("g1", Some(game("g1", "New"))).await.unwrap();

        assert_eq!(manager.combined_view().await.unwrap()[0].name(), Some("Old"));
    }

    #[tokio::test]
    async fn test_refresh_on_add_policy_overwrites() {
        let (manager, _) = manager_with(MockCatalogClient::new(), CachePolicy::RefreshOnAdd);
        manager.add_favorite(game("g1", "Old")).await.unwrap();
        manager.add_favorite(game("g1", "New")).await.unwrap();

        assert_eq!(manager.combined_view().await.unwrap()[0].name(), Some("New"));
        assert_eq!(manager.favorite_ids().await.unwrap(), vec!["g1"]);
    }

    #[tokio::test]
    async fn test_seed_revision_ticks_on_membership_change_only() {
        let (manager, _) = manager();
        let mut revisions = manager.subscribe();

        manager.add_favorite(game("g1", "Foo")).await.unwrap();
        assert!(revisions.has_changed().unwrap());
        revisions.borrow_and_update();

        manager.add_favorite(game("g1", "Foo")).await.unwrap();
        manager.remove_favorite("g2").await.unwrap();
        assert!(!revisions.has_changed().unwrap());

        manager.clear_all().await.unwrap();
        assert!(revisions.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_counts_and_seed() {
        let (manager, _) = manager();
        manager.add_favorite(game("g1", "Foo")).await.unwrap();
        manager.add_favorite(game("g2", "Bar")).await.unwrap();
        manager.mark_played("g2", None).await.unwrap();
        manager.mark_played("g3", Some(game("g3", "Baz"))).await.unwrap();

        let counts = manager.counts().await.unwrap();
        assert_eq!(counts.favorited, 2);
        assert_eq!(counts.played, 2);
        assert_eq!(counts.total, 3);
        assert_eq!(manager.seed_ids().await.unwrap(), vec!["g1", "g2", "g3"]);
    }

    #[tokio::test]
    async fn test_apply_played_ignores_blank_record() {
        let (manager, _) = manager();

        let transition = manager
            .apply_played(ResolvedRecord {
                record: GameRecord::new(""),
                source: RecordSource::Caller,
            })
            .await
            .unwrap();

        assert!(!transition.changed());
        assert!(manager.played_ids().await.unwrap().is_empty());
        assert!(manager.store.games().await.unwrap().is_empty());
    }

    /// Memory store whose Nth write fails, as if the process died there
    struct InterruptedStore {
        inner: MemoryStore,
        fail_at: usize,
        writes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Store for InterruptedStore {
        async fn read(&self, key: StoreKey) -> AppResult<Option<String>> {
            self.inner.read(key).await
        }

        async fn write(&self, key: StoreKey, value: String) -> AppResult<()> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_at {
                return Err(AppError::Store(format!("write {n} to {key} interrupted")));
            }
            self.inner.write(key, value).await
        }

        async fn clear(&self, key: StoreKey) -> AppResult<()> {
            self.inner.clear(key).await
        }

        fn name(&self) -> &'static str {
            "interrupted"
        }
    }

    fn interrupted_manager(fail_at: usize) -> CollectionManager {
        let mut catalog = MockCatalogClient::new();
        catalog.expect_get_game().never();
        let store = InterruptedStore {
            inner: MemoryStore::new(),
            fail_at,
            writes: AtomicUsize::new(0),
        };
        CollectionManager::new(
            PersistedStore::new(Arc::new(store)),
            Arc::new(catalog),
            CachePolicy::KeepFirst,
        )
    }

    /// Every set member still has its record
    async fn assert_no_dangling(manager: &CollectionManager) {
        let games = manager.store.games().await.unwrap();
        let favorites = manager.store.favorite_ids().await.unwrap();
        let played = manager.store.played_ids().await.unwrap();
        for id in favorites.iter().chain(played.iter()) {
            assert!(games.contains_key(id), "missing record for {id}");
        }
    }

    #[tokio::test]
    async fn test_interrupted_add_favorite_leaves_only_orphan() {
        // write 1 caches the record, write 2 saves the favorites
        let manager = interrupted_manager(2);

        assert_err!(manager.add_favorite(game("g1", "Foo")).await);

        assert!(manager.favorite_ids().await.unwrap().is_empty());
        assert!(manager.store.games().await.unwrap().contains_key("g1"));
        assert_eq!(manager.prune_orphans().await.unwrap(), 1);
        assert_consistent(&manager).await;
    }

    #[tokio::test]
    async fn test_interrupted_cache_write_changes_nothing() {
        let manager = interrupted_manager(1);

        assert_err!(manager.add_favorite(game("g1", "Foo")).await);

        assert_eq!(manager.counts().await.unwrap(), CollectionCounts::default());
        assert!(manager.store.games().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_apply_played_leaves_only_orphan() {
        let manager = interrupted_manager(2);

        assert_err!(
            manager
                .apply_played(ResolvedRecord {
                    record: game("g1", "Foo"),
                    source: RecordSource::Caller,
                })
                .await
        );

        assert!(manager.played_ids().await.unwrap().is_empty());
        assert!(manager.store.games().await.unwrap().contains_key("g1"));
        assert_eq!(manager.prune_orphans().await.unwrap(), 1);
        assert_consistent(&manager).await;
    }

    #[tokio::test]
    async fn test_interrupted_unfavorite_eviction_keeps_set_change() {
        // writes 1-2 favorite the game, 3 saves the favorites, 4 evicts
        let manager = interrupted_manager(4);
        manager.add_favorite(game("g1", "Foo")).await.unwrap();

        assert_err!(manager.remove_favorite("g1").await);

        assert!(manager.favorite_ids().await.unwrap().is_empty());
        assert!(manager.store.games().await.unwrap().contains_key("g1"));
        assert_eq!(manager.prune_orphans().await.unwrap(), 1);
        assert_consistent(&manager).await;
    }

    #[tokio::test]
    async fn test_interrupted_unplayed_eviction_keeps_set_change() {
        let manager = interrupted_manager(4);
        manager
            .mark_played("g1", Some(game("g1", "Foo")))
            .await
            .unwrap();

        assert_err!(manager.mark_unplayed("g1").await);

        assert!(manager.played_ids().await.unwrap().is_empty());
        assert!(manager.store.games().await.unwrap().contains_key("g1"));
        assert_eq!(manager.prune_orphans().await.unwrap(), 1);
        assert_consistent(&manager).await;
    }

    #[tokio::test]
    async fn test_interruption_at_any_write_never_loses_a_record() {
        for fail_at in 1..=8 {
            let manager = interrupted_manager(fail_at);
            let _ = manager.add_favorite(game("g1", "Foo")).await;
            let _ = manager.mark_played("g2", Some(game("g2", "Bar"))).await;
            let _ = manager.remove_favorite("g1").await;
            let _ = manager.mark_unplayed("g2").await;

            assert_no_dangling(&manager).await;
            manager.prune_orphans().await.unwrap();
            assert_consistent(&manager).await;
        }
    }

    /// Catalog whose fetch blocks until released
    struct GatedCatalog {
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl CatalogClient for GatedCatalog {
        async fn get_game(&self, id: &str) -> AppResult<GameRecord> {
            self.release.notified().await;
            Ok(GameRecord::new(id).with_field("name", "Foo"))
        }

        async fn get_games_by_ids(&self, _ids: &[String]) -> AppResult<Vec<GameRecord>> {
            Ok(vec![])
        }

        async fn get_recommendations(
            &self,
            _seed_ids: &[String],
            _exclude_seed: bool,
            _limit: usize,
        ) -> AppResult<Vec<String>> {
            Ok(vec![])
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_pending_fetch_is_not_visible_until_resolved() {
        let release = Arc::new(Notify::new());
        let store = PersistedStore::new(Arc::new(MemoryStore::new()));
        let manager = Arc::new(CollectionManager::new(
            store,
            Arc::new(GatedCatalog {
                release: release.clone(),
            }),
            CachePolicy::KeepFirst,
        ));

        let pending = tokio::spawn({
            let manager = manager.clone();
            async move { manager.mark_played("g1", None).await }
        });
        tokio::task::yield_now().await;

        // Other operations proceed while the fetch is outstanding
        manager.add_favorite(game("g2", "Bar")).await.unwrap();
        assert_eq!(manager.state_of("g1").await.unwrap(), GameState::Unknown);
        assert_eq!(manager.combined_view().await.unwrap().len(), 1);

        release.notify_one();
        let transition = pending.await.unwrap().unwrap();

        assert_eq!(transition.to, GameState::PlayedOnly);
        assert_eq!(manager.combined_view().await.unwrap().len(), 2);
        assert_consistent(&manager).await;
    }
}
