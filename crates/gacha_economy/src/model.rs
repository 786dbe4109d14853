//! # Data Model
//!
//! Records shared by the stores and the services.

use serde::{Deserialize, Serialize};

/// Opaque player identifier.
pub type PlayerId = String;

/// Collection item identifier.
pub type ItemId = String;

/// A player record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    /// Unique identifier.
    pub id: PlayerId,
    /// Authentication token handed to the client.
    pub auth_token: String,
    /// Display name.
    pub name: String,
    /// Best score ever reported. Never decreases.
    pub high_score: u64,
    /// Coin balance.
    pub coin: u64,
}

impl Player {
    /// Creates a fresh player with zero score and zero coin.
    #[must_use]
    pub fn new(id: impl Into<PlayerId>, auth_token: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            auth_token: auth_token.into(),
            name: name.into(),
            high_score: 0,
            coin: 0,
        }
    }

    /// Sets the starting balance.
    #[must_use]
    pub const fn with_coin(mut self, coin: u64) -> Self {
        self.coin = coin;
        self
    }

    /// Sets the best score.
    #[must_use]
    pub const fn with_high_score(mut self, high_score: u64) -> Self {
        self.high_score = high_score;
        self
    }
}

/// One row of the probability table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbabilityEntry {
    /// The item this row can produce.
    pub item_id: ItemId,
    /// Relative weight (higher = more common).
    pub weight: u32,
}

impl ProbabilityEntry {
    /// Creates a new probability entry.
    #[must_use]
    pub fn new(item_id: impl Into<ItemId>, weight: u32) -> Self {
        Self {
            item_id: item_id.into(),
            weight,
        }
    }
}

/// A (player, item) ownership fact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OwnedItem {
    /// The owner.
    pub player_id: PlayerId,
    /// The owned item.
    pub item_id: ItemId,
}

/// Static item metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Rarity tier (higher = rarer).
    pub rarity: u8,
}

impl CatalogItem {
    /// Creates a new catalog item.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>, rarity: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rarity,
        }
    }
}

/// Outcome of a single draw within a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DrawResult {
    /// The drawn item.
    pub item_id: ItemId,
    /// Display name from the catalog.
    pub name: String,
    /// Rarity from the catalog.
    pub rarity: u8,
    /// True only for the first time this player ever got the item.
    pub is_new: bool,
}

/// One line of a leaderboard page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankInfo {
    /// Player id.
    pub user_id: PlayerId,
    /// Player display name.
    pub user_name: String,
    /// 1-based position.
    pub rank: u64,
    /// Best score.
    pub score: u64,
}
