pub mod catalog;
pub mod collection;
pub mod recommendations;

pub use catalog::{CatalogClient, HttpCatalogClient};
pub use collection::{CachePolicy, CollectionManager};
pub use recommendations::RecommendationAggregator;
