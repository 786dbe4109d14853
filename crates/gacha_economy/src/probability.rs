//! # Weighted Draw Selection
//!
//! Cumulative-distribution inversion over the probability table.
//!
//! ```text
//! weights:     [ 70 | 20 | 10 ]
//! cumulative:  [ 70 | 90 | 100 ]      total = 100
//! roll r in [0, 100)  ->  first entry with cumulative > r
//! ```
//!
//! Cumulative thresholds are pre-computed once per table, so each pick is a
//! binary search. Entries keep table order, so a seeded RNG reproduces the
//! exact same sequence.

use std::collections::HashMap;

use rand::Rng;

use crate::error::{GachaError, GachaResult};
use crate::model::{ItemId, ProbabilityEntry};

/// A validated drop table ready for sampling.
#[derive(Clone, Debug)]
pub struct WeightedTable {
    entries: Vec<ProbabilityEntry>,
    /// Running threshold after each entry.
    cumulative: Vec<u64>,
    total_weight: u64,
}

impl WeightedTable {
    /// Builds a table from entries in their stable order.
    ///
    /// Zero-weight entries are kept but can never be picked.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::Configuration`] if the table is empty or its
    /// weights sum to zero.
    pub fn new(entries: Vec<ProbabilityEntry>) -> GachaResult<Self> {
        if entries.is_empty() {
            return Err(GachaError::Configuration("probability table is empty".to_string()));
        }

        let mut cumulative = Vec::with_capacity(entries.len());
        let mut total_weight = 0u64;
        for entry in &entries {
            total_weight += u64::from(entry.weight);
            cumulative.push(total_weight);
        }

        if total_weight == 0 {
            return Err(GachaError::Configuration(
                "probability table weights sum to zero".to_string(),
            ));
        }

        Ok(Self {
            entries,
            cumulative,
            total_weight,
        })
    }

    /// Sum of all weights. Always positive.
    #[inline]
    #[must_use]
    pub const fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// The entries in table order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ProbabilityEntry] {
        &self.entries
    }

    /// Maps a roll in `[0, total_weight)` to an item.
    ///
    /// Rolls at or past the total clamp to the last entry.
    #[must_use]
    pub fn pick_with_roll(&self, roll: u64) -> &ItemId {
        let index = self.cumulative.partition_point(|&threshold| threshold <= roll);
        &self.entries[index.min(self.entries.len() - 1)].item_id
    }

    /// Picks one item.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &ItemId {
        let roll = rng.gen_range(0..self.total_weight);
        self.pick_with_roll(roll)
    }

    /// Picks `times` items independently, in draw order.
    pub fn pick_many<R: Rng + ?Sized>(&self, times: usize, rng: &mut R) -> Vec<ItemId> {
        (0..times).map(|_| self.pick(rng).clone()).collect()
    }

    /// Runs `iterations` picks and returns the histogram.
    pub fn run_statistics<R: Rng + ?Sized>(&self, iterations: u64, rng: &mut R) -> DrawStatistics {
        let mut stats = DrawStatistics::new();
        for _ in 0..iterations {
            let item = self.pick(rng);
            stats.total_draws += 1;
            *stats.item_counts.entry(item.clone()).or_insert(0) += 1;
        }
        stats
    }
}

/// Histogram from draw simulation.
#[derive(Clone, Debug, Default)]
pub struct DrawStatistics {
    /// Total picks performed.
    pub total_draws: u64,
    /// Pick counts by item id.
    pub item_counts: HashMap<ItemId, u64>,
}

impl DrawStatistics {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observed frequency of `item_id` in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency(&self, item_id: &str) -> f64 {
        if self.total_draws == 0 {
            return 0.0;
        }
        let count = self.item_counts.get(item_id).copied().unwrap_or(0);
        count as f64 / self.total_draws as f64
    }
}
