mod collection;
mod game;

pub use collection::{CollectionCounts, GameCache, GameState, IdList, Transition};
pub use game::GameRecord;
