use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::{
    error::AppResult,
    models::GameRecord,
    services::{catalog::CatalogClient, collection::CollectionManager},
};

/// Loading state exposed to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecommendationStatus {
    Idle,
    Loading,
    Ready,
    Failed { message: String },
}

/// Latest recommendation result
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationSnapshot {
    pub status: RecommendationStatus,
    pub games: Vec<GameRecord>,
    /// Token of the refresh that produced this snapshot
    pub token: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for RecommendationSnapshot {
    fn default() -> Self {
        Self {
            status: RecommendationStatus::Idle,
            games: Vec::new(),
            token: 0,
            refreshed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This refresh was the most recent one and its result is now visible
    Applied { count: usize },
    /// A newer refresh started meanwhile; this result was thrown away
    Superseded { token: u64 },
}

/// Drops candidates that are in the seed, keeping rank order and the first
/// occurrence of any duplicate
pub fn exclude_seed(candidates: Vec<String>, seed: &[String]) -> Vec<String> {
    let seed: HashSet<&str> = seed.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|id| !seed.contains(id.as_str()) && seen.insert(id.clone()))
        .collect()
}

/// Puts batch-fetched records back into candidate rank order
fn order_by_rank(ranked_ids: &[String], records: Vec<GameRecord>) -> Vec<GameRecord> {
    let mut by_id: HashMap<String, GameRecord> = records
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect();
    ranked_ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Recommends games similar to the favorited and played ones
///
/// Each refresh takes a new token; only the refresh holding the latest
/// token may publish its result, so overlapping refreshes resolve to the
/// most recently started one.
pub struct RecommendationAggregator {
    collection: Arc<CollectionManager>,
    catalog: Arc<dyn CatalogClient>,
    limit: usize,
    latest_token: AtomicU64,
    snapshot: RwLock<RecommendationSnapshot>,
}

/// Handle for stopping the background refresh task
pub struct RefreshWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshWorkerHandle {
    /// Signals the refresh task to stop and waits for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
        tracing::info!("Recommendation refresh task stopped");
    }
}

impl RecommendationAggregator {
    pub fn new(
        collection: Arc<CollectionManager>,
        catalog: Arc<dyn CatalogClient>,
        limit: usize,
    ) -> Self {
        Self {
            collection,
            catalog,
            limit,
            latest_token: AtomicU64::new(0),
            snapshot: RwLock::new(RecommendationSnapshot::default()),
        }
    }

    pub async fn snapshot(&self) -> RecommendationSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Recomputes recommendations from the current seed
    ///
    /// Returns the error of a failed refresh only if that refresh was still
    /// the latest; a superseded refresh always reports `Superseded`.
    pub async fn refresh(&self) -> AppResult<RefreshOutcome> {
        let token = self.latest_token.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut snapshot = self.snapshot.write().await;
            if self.is_latest(token) {
                snapshot.status = RecommendationStatus::Loading;
            }
        }

        let result = self.compute().await;

        let mut snapshot = self.snapshot.write().await;
        if !self.is_latest(token) {
            tracing::debug!(token, "Discarding superseded recommendation refresh");
            return Ok(RefreshOutcome::Superseded { token });
        }

        snapshot.token = token;
        snapshot.refreshed_at = Some(Utc::now());
        match result {
            Ok(games) => {
                let count = games.len();
                snapshot.status = RecommendationStatus::Ready;
                snapshot.games = games;
                tracing::info!(token, count, "Recommendations refreshed");
                Ok(RefreshOutcome::Applied { count })
            }
            Err(e) => {
                tracing::warn!(token, error = %e, "Recommendation refresh failed");
                snapshot.status = RecommendationStatus::Failed {
                    message: e.to_string(),
                };
                snapshot.games.clear();
                Err(e)
            }
        }
    }

    fn is_latest(&self, token: u64) -> bool {
        self.latest_token.load(Ordering::SeqCst) == token
    }

    async fn compute(&self) -> AppResult<Vec<GameRecord>> {
        let seed = self.collection.seed_ids().await?;
        if seed.is_empty() {
            return Ok(vec![]);
        }

        let candidates = self
            .catalog
            .get_recommendations(&seed, true, self.limit)
            .await?;
        let received = candidates.len();
        let ranked = exclude_seed(candidates, &seed);
        if ranked.len() != received {
            tracing::debug!(
                received,
                kept = ranked.len(),
                "Filtered seed games out of recommendations"
            );
        }
        if ranked.is_empty() {
            return Ok(vec![]);
        }

        let records = self.catalog.get_games_by_ids(&ranked).await?;
        Ok(order_by_rank(&ranked, records))
    }

    /// Spawns a task that refreshes now and after every seed change
    ///
    /// Each refresh runs in its own task so a slow catalog never delays
    /// reacting to the next change; stale results are dropped by token.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> RefreshWorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let mut seed_rx = self.collection.subscribe();
        let aggregator = Arc::clone(self);

        let task = tokio::spawn(async move {
            tracing::info!("Recommendation refresh task started");
            Self::spawn_refresh(&aggregator);

            loop {
                tokio::select! {
                    changed = seed_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        Self::spawn_refresh(&aggregator);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        RefreshWorkerHandle { shutdown_tx, task }
    }

    fn spawn_refresh(aggregator: &Arc<Self>) {
        let aggregator = Arc::clone(aggregator);
        tokio::spawn(async move {
            // Failures are already recorded in the snapshot
            let _ = aggregator.refresh().await;
        });
    }
}
