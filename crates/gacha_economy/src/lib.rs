//! # Gacha Economy
//!
//! Coin, randomized item draws and the score leaderboard for the dojo game
//! backend.
//!
//! ## Design Principles
//!
//! 1. **Integer coin** - Balances, costs and rewards are `u64`; rates are basis points
//! 2. **Short transactions** - Selection runs outside the transaction; only the
//!    balance check and the writes hold the player row lock
//! 3. **All-or-nothing draws** - Items are granted and coin is charged together, or neither
//! 4. **Injected stores** - Every store is a trait object handed in at construction
//! 5. **External configuration** - Costs, rates and tables live in TOML files
//!
//! ## Thread Safety
//!
//! Services are `Send + Sync` and hold no mutable state. Concurrent draws for
//! the same player are serialized by the store's row lock; draws for
//! different players never contend.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gacha_economy::{DrawEngine, GachaSettings, MemoryStore};
//!
//! let settings = GachaSettings::load("data/gacha.toml")?;
//! let store = MemoryStore::from_settings(&settings);
//! let engine = DrawEngine::new(store.stores(), settings.economy.clone())?;
//!
//! for result in engine.draw(&player_id, 10)? {
//!     println!("{} (rarity {}) new={}", result.name, result.rarity, result.is_new);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod account;
pub mod collection;
pub mod config;
pub mod draw;
pub mod error;
pub mod game;
pub mod memory;
pub mod model;
pub mod probability;
pub mod ranking;
pub mod store;

pub use account::{AccountService, NewAccount};
pub use collection::{plan_new_items, CollectionEntry, CollectionService, NewItemPlan};
pub use config::{GachaConfig, GachaSettings};
pub use draw::DrawEngine;
pub use error::{ErrorClass, FailPoint, GachaError, GachaResult, StoreError, StoreResult};
pub use game::{GameReward, GameService};
pub use memory::{MemoryStore, MemoryTx};
pub use model::{CatalogItem, DrawResult, ItemId, OwnedItem, Player, PlayerId, ProbabilityEntry, RankInfo};
pub use probability::{DrawStatistics, WeightedTable};
pub use ranking::RankingService;
pub use store::{
    Database, InventoryStore, ItemCatalog, PlayerStore, ProbabilityTable, Stores, Transaction,
};
