use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    error::AppResult,
    middleware::request_id::RequestId,
    models::{CollectionCounts, GameRecord, GameState, Transition},
    services::recommendations::RecommendationSnapshot,
};

use super::AppState;

// Request/Response types

#[derive(Debug, Default, Deserialize)]
pub struct MarkPlayedRequest {
    /// Full record, when the caller already has it
    pub game: Option<GameRecord>,
}

#[derive(Debug, Serialize)]
pub struct GameStateResponse {
    pub id: String,
    pub state: GameState,
}

#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub pruned: usize,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Every favorited or played game
pub async fn get_collection(State(state): State<AppState>) -> AppResult<Json<Vec<GameRecord>>> {
    Ok(Json(state.collection.combined_view().await?))
}

/// Remove all games, favorites and played marks
pub async fn clear_collection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<StatusCode> {
    state.collection.clear_all().await?;
    tracing::info!(request_id = %request_id, "Collection cleared by request");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_counts(State(state): State<AppState>) -> AppResult<Json<CollectionCounts>> {
    Ok(Json(state.collection.counts().await?))
}

pub async fn prune_collection(State(state): State<AppState>) -> AppResult<Json<PruneResponse>> {
    let pruned = state.collection.prune_orphans().await?;
    Ok(Json(PruneResponse { pruned }))
}

pub async fn get_game_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<GameStateResponse>> {
    let game_state = state.collection.state_of(&id).await?;
    Ok(Json(GameStateResponse {
        id,
        state: game_state,
    }))
}

pub async fn get_favorites(State(state): State<AppState>) -> AppResult<Json<Vec<GameRecord>>> {
    Ok(Json(state.collection.favorite_games().await?))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(record): Json<GameRecord>,
) -> AppResult<Json<Transition>> {
    tracing::debug!(request_id = %request_id, game_id = %record.id, "Add favorite requested");
    Ok(Json(state.collection.add_favorite(record).await?))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Transition>> {
    Ok(Json(state.collection.remove_favorite(&id).await?))
}

pub async fn get_played(State(state): State<AppState>) -> AppResult<Json<Vec<GameRecord>>> {
    Ok(Json(state.collection.played_games().await?))
}

pub async fn get_played_status(
    State(state): State<AppState>,
) -> AppResult<Json<HashMap<String, bool>>> {
    Ok(Json(state.collection.played_status().await?))
}

/// Mark a game played, fetching its record from the catalog if needed
///
/// Responds only once the game is actually in the played set, or with the
/// catalog error if the record could not be fetched.
pub async fn mark_played(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    body: Option<Json<MarkPlayedRequest>>,
) -> AppResult<Json<Transition>> {
    let known = body.and_then(|Json(request)| request.game);
    tracing::debug!(
        request_id = %request_id,
        game_id = %id,
        record_supplied = known.is_some(),
        "Mark played requested"
    );
    Ok(Json(state.collection.mark_played(&id, known).await?))
}

pub async fn mark_unplayed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Transition>> {
    Ok(Json(state.collection.mark_unplayed(&id).await?))
}

/// Latest recommendations with their loading status
pub async fn get_recommendations(State(state): State<AppState>) -> Json<RecommendationSnapshot> {
    Json(state.recommendations.snapshot().await)
}

/// Refresh recommendations now and return the resulting snapshot
pub async fn refresh_recommendations(
    State(state): State<AppState>,
) -> AppResult<Json<RecommendationSnapshot>> {
    state.recommendations.refresh().await?;
    Ok(Json(state.recommendations.snapshot().await))
}
