//! # Leaderboard
//!
//! Pages of players ordered by best score, highest first.
//!
//! Ranks are positional: the first row of a page starting at `offset` gets
//! rank `offset`, the next `offset + 1`, and so on. Equal scores still get
//! distinct ranks; the store orders ties by player id so pages are stable.

use crate::error::{GachaError, GachaResult};
use crate::model::RankInfo;
use crate::store::{Database, Stores};

/// Leaderboard queries.
pub struct RankingService<D: Database> {
    stores: Stores<D>,
    page_size: usize,
}

impl<D: Database> RankingService<D> {
    /// Creates a leaderboard over `stores` returning `page_size` rows per page.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::Configuration`] if `page_size` is zero.
    pub fn new(stores: Stores<D>, page_size: usize) -> GachaResult<Self> {
        if page_size == 0 {
            return Err(GachaError::Configuration(
                "ranking page size must be positive".to_string(),
            ));
        }
        Ok(Self { stores, page_size })
    }

    /// Rows per page.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns up to one page starting at the 1-based rank `offset`.
    ///
    /// An offset past the last player yields an empty page.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::InvalidArgument`] if `offset < 1` (checked before
    /// any store access) and [`GachaError::Storage`] on read failure.
    pub fn rank_info_list(&self, offset: i64) -> GachaResult<Vec<RankInfo>> {
        let first_rank = u64::try_from(offset)
            .ok()
            .filter(|&rank| rank >= 1)
            .ok_or_else(|| {
                GachaError::InvalidArgument(format!("offset must be at least 1, got {offset}"))
            })?;
        // Offsets beyond addressable memory cannot match any row
        let Ok(skip) = usize::try_from(first_rank - 1) else {
            return Ok(Vec::new());
        };

        let players = self
            .stores
            .players
            .select_by_high_score_desc(skip, self.page_size)?;

        Ok(players
            .into_iter()
            .zip(first_rank..)
            .map(|(player, rank)| RankInfo {
                user_id: player.id,
                user_name: player.name,
                rank,
                score: player.high_score,
            })
            .collect())
    }
}
