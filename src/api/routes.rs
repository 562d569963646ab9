use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Combined collection
        .route(
            "/collection",
            get(handlers::get_collection).delete(handlers::clear_collection),
        )
        .route("/collection/counts", get(handlers::get_counts))
        .route("/collection/prune", post(handlers::prune_collection))
        .route("/collection/games/:id", get(handlers::get_game_state))
        // Favorites
        .route(
            "/collection/favorites",
            get(handlers::get_favorites).post(handlers::add_favorite),
        )
        .route("/collection/favorites/:id", delete(handlers::remove_favorite))
        // Played
        .route("/collection/played", get(handlers::get_played))
        .route("/collection/played-status", get(handlers::get_played_status))
        .route(
            "/collection/played/:id",
            post(handlers::mark_played).delete(handlers::mark_unplayed),
        )
        // Recommendations
        .route("/recommendations", get(handlers::get_recommendations))
        .route(
            "/recommendations/refresh",
            post(handlers::refresh_recommendations),
        )
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
