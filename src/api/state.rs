use std::sync::Arc;

use crate::services::{CollectionManager, RecommendationAggregator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub collection: Arc<CollectionManager>,
    pub recommendations: Arc<RecommendationAggregator>,
}

impl AppState {
    pub fn new(
        collection: Arc<CollectionManager>,
        recommendations: Arc<RecommendationAggregator>,
    ) -> Self {
        Self {
            collection,
            recommendations,
        }
    }
}
