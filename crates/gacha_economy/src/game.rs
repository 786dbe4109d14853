//! # Game Finish
//!
//! Converts a finished game's score into coin and keeps the best score.
//!
//! The balance is shared with the draw engine, so the update goes through
//! the same locking read: a finish racing a draw on the same player is
//! serialized by the row lock and neither write is lost.

use crate::config::GachaConfig;
use crate::error::{GachaError, GachaResult};
use crate::store::{Database, Stores, Transaction};

/// What finishing a game changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameReward {
    /// Coin awarded for this game.
    pub coin: u64,
    /// Balance after the award.
    pub balance: u64,
    /// Best score after this game.
    pub high_score: u64,
}

/// Game-finish operations.
pub struct GameService<D: Database> {
    stores: Stores<D>,
    config: GachaConfig,
}

impl<D: Database> GameService<D> {
    /// Creates a game service over `stores`.
    #[must_use]
    pub const fn new(stores: Stores<D>, config: GachaConfig) -> Self {
        Self { stores, config }
    }

    /// Awards coin for `score` and raises the best score if beaten.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::InvalidArgument`] for a negative score,
    /// [`GachaError::NotFound`] for an unknown player and
    /// [`GachaError::Storage`] on store failure.
    pub fn finish_game(&self, player_id: &str, score: i64) -> GachaResult<GameReward> {
        let score = u64::try_from(score).map_err(|_| {
            GachaError::InvalidArgument(format!("score must not be negative, got {score}"))
        })?;
        let reward = self.config.reward_for_score(score);

        let mut tx = self.stores.db.begin()?;
        let outcome = self.apply(&mut tx, player_id, score, reward);
        let reward = match outcome {
            Ok(reward) => {
                tx.commit()?;
                reward
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(player_id, error = %rollback_err, "game finish rollback failed");
                }
                return Err(err);
            }
        };

        tracing::info!(
            player_id,
            score,
            reward = reward.coin,
            balance = reward.balance,
            "game finished"
        );
        Ok(reward)
    }

    fn apply(
        &self,
        tx: &mut D::Tx,
        player_id: &str,
        score: u64,
        reward: u64,
    ) -> GachaResult<GameReward> {
        let player = self
            .stores
            .players
            .select_for_update(tx, player_id)?
            .ok_or_else(|| GachaError::NotFound(format!("player {player_id}")))?;

        let balance = player.coin.saturating_add(reward);
        let high_score = player.high_score.max(score);
        self.stores
            .players
            .update_coin_and_high_score(tx, player_id, balance, high_score)?;

        Ok(GameReward {
            coin: reward,
            balance,
            high_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailPoint, StoreError};
    use crate::memory::MemoryStore;
    use crate::model::Player;
    use crate::store::PlayerStore;

    fn create_test_store() -> MemoryStore {
        let store = MemoryStore::default();
        store
            .insert(Player::new("p1", "t", "alice").with_coin(50).with_high_score(500))
            .unwrap();
        store
    }

    #[test]
    fn test_reward_and_new_high_score() {
        let store = create_test_store();
        let game = GameService::new(store.stores(), GachaConfig::default());

        let reward = game.finish_game("p1", 1234).unwrap();
        assert_eq!(
            reward,
            GameReward {
                coin: 123,
                balance: 173,
                high_score: 1234
            }
        );
        let player = store.get("p1").unwrap().unwrap();
        assert_eq!((player.coin, player.high_score), (173, 1234));
    }

    #[test]
    fn test_high_score_never_decreases() {
        let store = create_test_store();
        let game = GameService::new(store.stores(), GachaConfig::default());

        let reward = game.finish_game("p1", 10).unwrap();
        assert_eq!(reward.coin, 1);
        assert_eq!(reward.high_score, 500);
        assert_eq!(store.get("p1").unwrap().unwrap().high_score, 500);
    }

    #[test]
    fn test_negative_score_and_unknown_player() {
        let store = create_test_store();
        let game = GameService::new(store.stores(), GachaConfig::default());
        assert!(matches!(
            game.finish_game("p1", -1),
            Err(GachaError::InvalidArgument(_))
        ));
        assert!(matches!(
            game.finish_game("ghost", 10),
            Err(GachaError::NotFound(_))
        ));
        assert_eq!(store.held_locks(), 0);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = create_test_store();
        store.fail_at(FailPoint::UpdateCoin);
        let game = GameService::new(store.stores(), GachaConfig::default());

        let err = game.finish_game("p1", 9999).unwrap_err();
        assert_eq!(err, GachaError::Storage(StoreError::InjectedFailure(FailPoint::UpdateCoin)));
        let player = store.get("p1").unwrap().unwrap();
        assert_eq!((player.coin, player.high_score), (50, 500));
    }
}
