//! # Player Accounts
//!
//! Creation, token lookup and profile edits. Ids and tokens are random
//! UUIDv4 strings; a new player starts with zero coin and zero score.

use uuid::Uuid;

use crate::error::{GachaError, GachaResult};
use crate::model::{Player, PlayerId};
use crate::store::{Database, Stores};

/// Credentials handed back to a newly created player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    /// The generated player id.
    pub player_id: PlayerId,
    /// The generated authentication token.
    pub token: String,
}

/// Account operations.
pub struct AccountService<D: Database> {
    stores: Stores<D>,
}

impl<D: Database> AccountService<D> {
    /// Creates an account service over `stores`.
    #[must_use]
    pub const fn new(stores: Stores<D>) -> Self {
        Self { stores }
    }

    /// Registers a new player.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::Storage`] if the player cannot be stored.
    pub fn create_player(&self, name: &str) -> GachaResult<NewAccount> {
        let player_id = Uuid::new_v4().to_string();
        let token = Uuid::new_v4().to_string();

        self.stores
            .players
            .insert(Player::new(player_id.clone(), token.clone(), name))?;

        tracing::info!(player_id = %player_id, "player created");
        Ok(NewAccount { player_id, token })
    }

    /// Resolves an authentication token to its player.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::NotFound`] for an unknown token.
    pub fn authenticate(&self, token: &str) -> GachaResult<Player> {
        self.stores
            .players
            .find_by_token(token)?
            .ok_or_else(|| GachaError::NotFound("auth token".to_string()))
    }

    /// Reads a player profile.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::NotFound`] for an unknown player.
    pub fn get_player(&self, player_id: &str) -> GachaResult<Player> {
        self.stores
            .players
            .get(player_id)?
            .ok_or_else(|| GachaError::NotFound(format!("player {player_id}")))
    }

    /// Changes a player's display name.
    ///
    /// # Errors
    ///
    /// Returns [`GachaError::NotFound`] for an unknown player.
    pub fn rename_player(&self, player_id: &str, name: &str) -> GachaResult<()> {
        if self.stores.players.update_name(player_id, name)? {
            Ok(())
        } else {
            Err(GachaError::NotFound(format!("player {player_id}")))
        }
    }
}
