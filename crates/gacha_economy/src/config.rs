//! # Economy Configuration
//!
//! All balance data is loaded from an external TOML file once at startup:
//!
//! ```toml
//! [economy]
//! draw_cost = 100
//! max_draw_times = 100
//! reward_rate_bp = 1000      # 10% of the score
//! ranking_page_size = 10
//! lock_wait_timeout_ms = 5000
//!
//! [[items]]
//! id = "1001"
//! name = "Fire Dragon"
//! rarity = 3
//!
//! [[probabilities]]
//! item_id = "1001"
//! weight = 2
//! ```
//!
//! Coin math is integer only. Rates are basis points (10000 = 100%).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GachaError, GachaResult};
use crate::model::{CatalogItem, ProbabilityEntry};

/// Basis points in 100%.
pub const BASIS_POINTS: u64 = 10_000;

/// Numeric tunables of the economy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GachaConfig {
    /// Coin cost of a single draw.
    pub draw_cost: u64,
    /// Largest draw count a single request may ask for.
    pub max_draw_times: u64,
    /// Coin awarded per point of score, in basis points.
    pub reward_rate_bp: u32,
    /// Number of rows in one leaderboard page.
    pub ranking_page_size: usize,
    /// How long a locking read may wait for another transaction.
    pub lock_wait_timeout_ms: u64,
}

impl Default for GachaConfig {
    fn default() -> Self {
        Self {
            draw_cost: 100,
            max_draw_times: 100,
            reward_rate_bp: 1000,
            ranking_page_size: 10,
            lock_wait_timeout_ms: 5000,
        }
    }
}

impl GachaConfig {
    /// Checks the values for degenerate settings.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::Configuration`] if the draw cost, the draw
    /// limit or the page size is zero.
    pub fn validate(&self) -> GachaResult<()> {
        if self.draw_cost == 0 {
            return Err(GachaError::Configuration("draw_cost must be positive".to_string()));
        }
        if self.max_draw_times == 0 {
            return Err(GachaError::Configuration("max_draw_times must be positive".to_string()));
        }
        if self.ranking_page_size == 0 {
            return Err(GachaError::Configuration(
                "ranking_page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Total coin consumed by `times` draws, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn consumption(&self, times: u64) -> Option<u64> {
        self.draw_cost.checked_mul(times)
    }

    /// Coin awarded for finishing a game with `score`, truncated toward zero.
    #[inline]
    #[must_use]
    pub fn reward_for_score(&self, score: u64) -> u64 {
        let reward = u128::from(score) * u128::from(self.reward_rate_bp) / u128::from(BASIS_POINTS);
        u64::try_from(reward).unwrap_or(u64::MAX)
    }

    /// Lock wait timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }
}

/// A full settings file: tunables plus reference data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GachaSettings {
    /// Numeric tunables.
    pub economy: GachaConfig,
    /// The item catalog.
    pub items: Vec<CatalogItem>,
    /// The drop table.
    pub probabilities: Vec<ProbabilityEntry>,
}

impl GachaSettings {
    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::Configuration`] on malformed TOML, invalid
    /// tunables, or a probability row that names an unknown item.
    pub fn from_toml_str(text: &str) -> GachaResult<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| GachaError::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and parses a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::Configuration`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> GachaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GachaError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> GachaResult<()> {
        self.economy.validate()?;
        for entry in &self.probabilities {
            if !self.items.iter().any(|item| item.id == entry.item_id) {
                return Err(GachaError::Configuration(format!(
                    "probability row references unknown item {}",
                    entry.item_id
                )));
            }
        }
        Ok(())
    }
}
