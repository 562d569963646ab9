//! Catalog API client over HTTP
//!
//! API Flow:
//! 1. Single game: GET /api/games/{id} → full record, 404 when unknown
//! 2. Batch: POST /api/games/by-ids {"ids": [...]} → records that resolved
//! 3. Recommendations: POST /api/recommendations → {"ids": [...]} ranked
//!
//! Error bodies carry a `detail` field which is surfaced as the message.

use crate::{
    error::{AppError, AppResult},
    models::GameRecord,
    services::catalog::CatalogClient,
};
use reqwest::{Client as HttpClient, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct HttpCatalogClient {
    http_client: HttpClient,
    api_url: Url,
}

#[derive(Debug, Serialize)]
struct GamesByIdsRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct RecommendationRequest<'a> {
    seed_ids: &'a [String],
    exclude_seed: bool,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct RecommendationResponse {
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

impl HttpCatalogClient {
    pub fn new(api_url: impl AsRef<str>, timeout: Duration) -> AppResult<Self> {
        let api_url = Url::parse(api_url.as_ref()).map_err(|e| {
            AppError::InvalidInput(format!("Invalid catalog URL '{}': {}", api_url.as_ref(), e))
        })?;
        if api_url.cannot_be_a_base() {
            return Err(AppError::InvalidInput(format!(
                "Catalog URL '{}' cannot carry a path",
                api_url
            )));
        }

        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_url,
        })
    }

    /// Appends path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(format!("Catalog URL '{}' cannot carry a path", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn game_url(&self, id: &str) -> AppResult<Url> {
        self.endpoint(&["api", "games", id])
    }

    fn by_ids_url(&self) -> AppResult<Url> {
        self.endpoint(&["api", "games", "by-ids"])
    }

    fn recommendations_url(&self) -> AppResult<Url> {
        self.endpoint(&["api", "recommendations"])
    }

    /// Turns a non-success response into an error, preferring the body's `detail`
    async fn error_from(response: Response, what: &str) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body, what);

        if status == StatusCode::NOT_FOUND {
            AppError::NotFound(message)
        } else {
            AppError::ExternalApi(message)
        }
    }
}

fn error_message(status: StatusCode, body: &str, what: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .unwrap_or_else(|| format!("Error fetching {}: {}", what, status))
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_game(&self, id: &str) -> AppResult<GameRecord> {
        if id.trim().is_empty() {
            return Err(AppError::InvalidInput("Game ID is required".to_string()));
        }

        let response = self.http_client.get(self.game_url(id)?).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, "game").await);
        }

        let record: GameRecord = response.json().await?;
        tracing::debug!(game_id = %id, catalog = self.name(), "Game fetched");
        Ok(record)
    }

    async fn get_games_by_ids(&self, ids: &[String]) -> AppResult<Vec<GameRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .http_client
            .post(self.by_ids_url()?)
            .json(&GamesByIdsRequest { ids })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, "games by IDs").await);
        }

        let records: Vec<GameRecord> = response.json().await?;
        tracing::debug!(
            requested = ids.len(),
            resolved = records.len(),
            catalog = self.name(),
            "Game batch fetched"
        );
        Ok(records)
    }

    async fn get_recommendations(
        &self,
        seed_ids: &[String],
        exclude_seed: bool,
        limit: usize,
    ) -> AppResult<Vec<String>> {
        let response = self
            .http_client
            .post(self.recommendations_url()?)
            .json(&RecommendationRequest {
                seed_ids,
                exclude_seed,
                limit,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, "recommendations").await);
        }

        let body: RecommendationResponse = response.json().await?;
        Ok(body.ids)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
