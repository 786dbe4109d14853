//! # Store Interfaces
//!
//! The services never talk to a concrete database. They see four capabilities:
//!
//! - [`PlayerStore`] - player rows, including the locking read
//! - [`InventoryStore`] - which items each player owns
//! - [`ProbabilityTable`] - the drop weights
//! - [`ItemCatalog`] - item metadata
//!
//! Writes that must be atomic take an explicit transaction handle obtained
//! from [`Database::begin`]. The store never hides a transaction internally.

use std::sync::Arc;

use crate::error::StoreResult;
use crate::model::{CatalogItem, ItemId, OwnedItem, Player, ProbabilityEntry};

/// A unit of atomic work.
///
/// Dropping an unfinished transaction rolls it back.
pub trait Transaction: Send {
    /// Makes every write of this transaction visible and releases its locks.
    ///
    /// # Errors
    ///
    /// Returns a store error if the commit failed. The outcome is then unknown.
    fn commit(self) -> StoreResult<()>;

    /// Discards every write of this transaction and releases its locks.
    ///
    /// # Errors
    ///
    /// Returns a store error if the rollback itself failed.
    fn rollback(self) -> StoreResult<()>;
}

/// Source of transactions.
pub trait Database: Send + Sync {
    /// The transaction handle type.
    type Tx: Transaction;

    /// Opens a new transaction.
    ///
    /// # Errors
    ///
    /// Returns a store error if no transaction can be opened.
    fn begin(&self) -> StoreResult<Self::Tx>;
}

/// Player rows.
pub trait PlayerStore<Tx>: Send + Sync {
    /// Inserts a new player.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::DuplicateKey`] if the id or token is taken.
    fn insert(&self, player: Player) -> StoreResult<()>;

    /// Point lookup by id (committed state, no lock).
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn get(&self, player_id: &str) -> StoreResult<Option<Player>>;

    /// Point lookup by authentication token.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn find_by_token(&self, token: &str) -> StoreResult<Option<Player>>;

    /// Changes the display name. Returns `false` if the player does not exist.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn update_name(&self, player_id: &str, name: &str) -> StoreResult<bool>;

    /// Reads a player and takes an exclusive lock on the row until `tx` ends.
    ///
    /// Blocks while another transaction holds the lock.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::LockTimeout`] if the wait is too long.
    fn select_for_update(&self, tx: &mut Tx, player_id: &str) -> StoreResult<Option<Player>>;

    /// Writes a new balance inside `tx`.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn update_coin(&self, tx: &mut Tx, player_id: &str, coin: u64) -> StoreResult<()>;

    /// Writes a new balance and best score inside `tx`.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn update_coin_and_high_score(
        &self,
        tx: &mut Tx,
        player_id: &str,
        coin: u64,
        high_score: u64,
    ) -> StoreResult<()>;

    /// Players ordered by best score descending, then id ascending.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn select_by_high_score_desc(&self, skip: usize, limit: usize) -> StoreResult<Vec<Player>>;

    /// Total number of players.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn count(&self) -> StoreResult<usize>;
}

/// Ownership facts.
pub trait InventoryStore<Tx>: Send + Sync {
    /// Ids of every item `player_id` owns (committed state).
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn owned_item_ids(&self, player_id: &str) -> StoreResult<Vec<ItemId>>;

    /// Inserts all rows inside `tx` as one statement.
    ///
    /// Rows already owned (committed or earlier in `tx`) are skipped.
    /// Returns the number of rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn bulk_insert(&self, tx: &mut Tx, rows: &[OwnedItem]) -> StoreResult<usize>;
}

/// The drop table.
pub trait ProbabilityTable: Send + Sync {
    /// Every entry, in stable table order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn entries(&self) -> StoreResult<Vec<ProbabilityEntry>>;
}

/// Item metadata.
pub trait ItemCatalog: Send + Sync {
    /// Every item, in stable catalog order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn items(&self) -> StoreResult<Vec<CatalogItem>>;
}

/// The set of store handles a service is built from.
///
/// Cloning is cheap; every field is shared.
pub struct Stores<D: Database> {
    /// Transaction source.
    pub db: Arc<D>,
    /// Player rows.
    pub players: Arc<dyn PlayerStore<D::Tx>>,
    /// Ownership facts.
    pub inventory: Arc<dyn InventoryStore<D::Tx>>,
    /// Drop table.
    pub probabilities: Arc<dyn ProbabilityTable>,
    /// Item metadata.
    pub catalog: Arc<dyn ItemCatalog>,
}

impl<D: Database> Clone for Stores<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            players: Arc::clone(&self.players),
            inventory: Arc::clone(&self.inventory),
            probabilities: Arc::clone(&self.probabilities),
            catalog: Arc::clone(&self.catalog),
        }
    }
}
