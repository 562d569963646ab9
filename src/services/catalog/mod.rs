//! Remote game catalog abstraction
//!
//! The collection and recommendation services only see [`CatalogClient`],
//! so the HTTP client can be swapped for a mock or a fake in tests.

use crate::{error::AppResult, models::GameRecord};

pub mod http;

pub use http::HttpCatalogClient;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch the full record for one game
    ///
    /// Fails with [`AppError::NotFound`](crate::error::AppError::NotFound)
    /// when the catalog has no such game.
    async fn get_game(&self, id: &str) -> AppResult<GameRecord>;

    /// Fetch several records at once
    ///
    /// Unknown ids are simply absent from the result. Order is not
    /// guaranteed to match the request.
    async fn get_games_by_ids(&self, ids: &[String]) -> AppResult<Vec<GameRecord>>;

    /// Ranked ids of games similar to the seed
    async fn get_recommendations(
        &self,
        seed_ids: &[String],
        exclude_seed: bool,
        limit: usize,
    ) -> AppResult<Vec<String>>;

    /// Client name for logging and debugging
    fn name(&self) -> &'static str;
}
