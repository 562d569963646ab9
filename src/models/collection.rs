use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

use super::GameRecord;

/// Cached game records keyed by game id
pub type GameCache = HashMap<String, GameRecord>;

/// An ordered set of game ids
///
/// Persisted as a plain JSON array. Insertion order is kept so lists
/// display stably; membership is what matters for correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdList(Vec<String>);

impl IdList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|existing| existing == id)
    }

    /// Appends `id` unless already present. Returns whether it was added.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id.to_string());
        true
    }

    /// Removes `id` if present. Returns whether it was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != id);
        self.0.len() != before
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for IdList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = IdList::new();
        for id in iter {
            let id = id.into();
            list.insert(&id);
        }
        list
    }
}

/// Membership of a single game across the favorited and played sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Unknown,
    FavoritedOnly,
    PlayedOnly,
    Both,
}

impl GameState {
    pub fn from_membership(favorited: bool, played: bool) -> Self {
        match (favorited, played) {
            (false, false) => GameState::Unknown,
            (true, false) => GameState::FavoritedOnly,
            (false, true) => GameState::PlayedOnly,
            (true, true) => GameState::Both,
        }
    }

    pub fn is_favorited(self) -> bool {
        matches!(self, GameState::FavoritedOnly | GameState::Both)
    }

    pub fn is_played(self) -> bool {
        matches!(self, GameState::PlayedOnly | GameState::Both)
    }
}

impl Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameState::Unknown => write!(f, "unknown"),
            GameState::FavoritedOnly => write!(f, "favorited_only"),
            GameState::PlayedOnly => write!(f, "played_only"),
            GameState::Both => write!(f, "both"),
        }
    }
}

/// Result of a collection mutation, reported back for notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub id: String,
    pub from: GameState,
    pub to: GameState,
}

impl Transition {
    pub fn new(id: &str, from: GameState, to: GameState) -> Self {
        Self {
            id: id.to_string(),
            from,
            to,
        }
    }

    /// A transition that changed nothing
    pub fn unchanged(id: &str, state: GameState) -> Self {
        Self::new(id, state, state)
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Set sizes for the "my games" header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    pub favorited: usize,
    pub played: usize,
    /// Distinct games across both sets
    pub total: usize,
}
