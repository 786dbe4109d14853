//! # Draw Engine
//!
//! Turns "draw N times" into N weighted selections, marks first-time
//! acquisitions, and charges the player atomically.
//!
//! ## The Draw Pipeline
//!
//! ```text
//! draw(player, times) ->
//!   0. Validate times: positive, within the limit (before any store access)
//!   1. Pick N items from the probability table     (no transaction)
//!   2. Read owned items, plan is_new + inserts       (no transaction)
//!   3. BEGIN
//!   4. Locking read of the player row (authoritative balance)
//!   5. balance < cost * N  -> ROLLBACK, InsufficientBalance
//!   6. Bulk insert new items                          (skip if none)
//!   7. Write balance - cost * N
//!   8. COMMIT
//!   9. Return results computed in steps 1-2
//! ```
//!
//! Only steps 4-8 hold the row lock. Any failure there rolls back before the
//! error is returned, so no path leaves a transaction open or charges coin
//! without granting items (or the reverse). A failed commit is reported as
//! [`GachaError::Storage`] and is never retried here.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::collection::plan_new_items;
use crate::config::GachaConfig;
use crate::error::{GachaError, GachaResult};
use crate::model::{CatalogItem, DrawResult, ItemId, OwnedItem};
use crate::probability::WeightedTable;
use crate::store::{Database, Stores, Transaction};

/// The gacha draw transaction engine.
///
/// Holds no in-process locks and no mutable state. Every call reads fresh
/// reference data and lets the store serialize access to the balance.
pub struct DrawEngine<D: Database> {
    stores: Stores<D>,
    config: GachaConfig,
}

impl<D: Database> DrawEngine<D> {
    /// Creates a draw engine over `stores`.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::Configuration`] if `config` does not pass
    /// [`GachaConfig::validate`].
    pub fn new(stores: Stores<D>, config: GachaConfig) -> GachaResult<Self> {
        config.validate()?;
        Ok(Self { stores, config })
    }

    /// Per-draw coin cost.
    #[must_use]
    pub const fn draw_cost(&self) -> u64 {
        self.config.draw_cost
    }

    /// Draws `times` items for `player_id` with a fresh entropy-seeded RNG.
    ///
    /// # Errors
    ///
    /// - [`GachaError::InvalidArgument`] if `times <= 0` or above the configured limit
    /// - [`GachaError::Configuration`] if the probability table is degenerate
    /// - [`GachaError::NotFound`] if the player does not exist
    /// - [`GachaError::InsufficientBalance`] if the player cannot pay
    /// - [`GachaError::Storage`] on any store failure
    pub fn draw(&self, player_id: &str, times: i64) -> GachaResult<Vec<DrawResult>> {
        let mut rng = ChaCha20Rng::from_entropy();
        self.draw_with_rng(player_id, times, &mut rng)
    }

    /// Same as [`Self::draw`] with a caller-supplied random source.
    ///
    /// # Errors
    ///
    /// See [`Self::draw`].
    pub fn draw_with_rng<R: Rng + ?Sized>(
        &self,
        player_id: &str,
        times: i64,
        rng: &mut R,
    ) -> GachaResult<Vec<DrawResult>> {
        let count = validate_times(times)?;
        if count > self.config.max_draw_times {
            return Err(GachaError::InvalidArgument(format!(
                "times {times} exceeds the limit of {}",
                self.config.max_draw_times
            )));
        }
        let consumption = self.config.consumption(count).ok_or_else(|| {
            GachaError::InvalidArgument(format!("draw count {times} overflows the coin cost"))
        })?;
        let batch = usize::try_from(count)
            .map_err(|_| GachaError::InvalidArgument(format!("draw count {times} is too large")))?;

        // Step 1: selections, pure computation over read-only reference data
        let table = WeightedTable::new(self.stores.probabilities.entries()?)?;
        let selections = table.pick_many(batch, rng);

        let catalog: HashMap<ItemId, CatalogItem> = self
            .stores
            .catalog
            .items()?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        // Step 2: first-time acquisitions against the committed collection
        let owned = self.stores.inventory.owned_item_ids(player_id)?;
        let plan = plan_new_items(player_id, &owned, &selections);

        let results = selections
            .iter()
            .zip(&plan.is_new)
            .map(|(item_id, &is_new)| {
                let item = catalog.get(item_id).ok_or_else(|| {
                    GachaError::Configuration(format!("drawn item {item_id} is not in the catalog"))
                })?;
                Ok(DrawResult {
                    item_id: item.id.clone(),
                    name: item.name.clone(),
                    rarity: item.rarity,
                    is_new,
                })
            })
            .collect::<GachaResult<Vec<_>>>()?;

        tracing::debug!(player_id, times = count, new_items = plan.to_insert.len(), "draw selected");

        // Steps 3-8
        let balance = self.commit_draw(player_id, consumption, &plan.to_insert)?;

        tracing::info!(
            player_id,
            times = count,
            consumption,
            balance,
            new_items = plan.to_insert.len(),
            "draw committed"
        );

        Ok(results)
    }

    /// Runs the locked section inside one transaction. Returns the new balance.
    fn commit_draw(
        &self,
        player_id: &str,
        consumption: u64,
        to_insert: &[OwnedItem],
    ) -> GachaResult<u64> {
        let mut tx = self.stores.db.begin()?;

        match self.charge(&mut tx, player_id, consumption, to_insert) {
            Ok(balance) => {
                tx.commit().map_err(|err| {
                    tracing::error!(player_id, error = %err, "draw commit failed, outcome unknown");
                    GachaError::from(err)
                })?;
                Ok(balance)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(player_id, error = %rollback_err, "draw rollback failed");
                }
                match &err {
                    GachaError::InsufficientBalance { required, available } => {
                        tracing::warn!(player_id, required, available, "draw rejected");
                    }
                    other => tracing::warn!(player_id, error = %other, "draw rolled back"),
                }
                Err(err)
            }
        }
    }

    /// Steps 4-7. Must only be called with an open transaction.
    fn charge(
        &self,
        tx: &mut D::Tx,
        player_id: &str,
        consumption: u64,
        to_insert: &[OwnedItem],
    ) -> GachaResult<u64> {
        let player = self
            .stores
            .players
            .select_for_update(tx, player_id)?
            .ok_or_else(|| GachaError::NotFound(format!("player {player_id}")))?;

        if player.coin < consumption {
            return Err(GachaError::InsufficientBalance {
                required: consumption,
                available: player.coin,
            });
        }

        if !to_insert.is_empty() {
            self.stores.inventory.bulk_insert(tx, to_insert)?;
        }

        let balance = player.coin - consumption;
        self.stores.players.update_coin(tx, player_id, balance)?;
        Ok(balance)
    }
}

/// Rejects non-positive draw counts.
fn validate_times(times: i64) -> GachaResult<u64> {
    u64::try_from(times)
        .ok()
        .filter(|&count| count > 0)
        .ok_or_else(|| GachaError::InvalidArgument(format!("times must be positive, got {times}")))
}
