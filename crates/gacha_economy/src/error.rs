//! # Economy Error Types
//!
//! All errors that can occur in the gacha economy.
//!
//! Two layers:
//! - [`StoreError`] - what a backing store reports (lock waits, key clashes, I/O).
//! - [`GachaError`] - what a caller of the engine sees. Every store error is
//!   folded into [`GachaError::Storage`].
//!
//! Neither layer knows about HTTP. The transport maps [`ErrorClass`] to its
//! own status codes.

use thiserror::Error;

/// Points in a transaction where a test store can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// The bulk insert of newly owned items.
    BulkInsert,
    /// The balance write.
    UpdateCoin,
    /// The commit itself.
    Commit,
    /// The score-ordered player scan behind the leaderboard.
    ScoreScan,
}

/// Errors reported by a backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Waited too long for another transaction's row lock.
    #[error("lock wait timeout on player {player_id} after {waited_ms}ms")]
    LockTimeout {
        /// The player row that was locked.
        player_id: String,
        /// How long we waited.
        waited_ms: u64,
    },

    /// A unique key already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A failure armed by a test through [`FailPoint`].
    #[error("injected failure at {0:?}")]
    InjectedFailure(FailPoint),

    /// Any other backend failure.
    #[error("storage backend: {0}")]
    Backend(String),
}

/// How a failure should be reported to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The client sent something it can fix.
    BadRequest,
    /// The server cannot serve the request; the client cannot self-correct.
    ServerSide,
}

/// Errors that can occur in the gacha economy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GachaError {
    /// Bad caller input (non-positive draw count, offset below 1, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Degenerate reference data or config (empty probability table, zero cost).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The referenced player (or token) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Not enough coin to pay for the draw.
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        /// Total consumption of the request.
        required: u64,
        /// Balance seen under the row lock.
        available: u64,
    },

    /// Underlying read, write or commit failure.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl GachaError {
    /// Returns the reporting class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument(_) | Self::InsufficientBalance { .. } => ErrorClass::BadRequest,
            Self::Configuration(_) | Self::NotFound(_) | Self::Storage(_) => ErrorClass::ServerSide,
        }
    }
}

/// Result type for economy operations.
pub type GachaResult<T> = Result<T, GachaError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_bad_request() {
        assert_eq!(
            GachaError::InvalidArgument("times".into()).class(),
            ErrorClass::BadRequest
        );
        assert_eq!(
            GachaError::InsufficientBalance { required: 100, available: 0 }.class(),
            ErrorClass::BadRequest
        );
    }

    #[test]
    fn test_server_errors_are_server_side() {
        assert_eq!(GachaError::NotFound("p".into()).class(), ErrorClass::ServerSide);
        assert_eq!(
            GachaError::Configuration("empty".into()).class(),
            ErrorClass::ServerSide
        );
        let err: GachaError = StoreError::Backend("disk full".into()).into();
        assert_eq!(err.class(), ErrorClass::ServerSide);
    }

    #[test]
    fn test_lock_timeout_message() {
        let err = GachaError::from(StoreError::LockTimeout {
            player_id: "p1".into(),
            waited_ms: 50,
        });
        assert_eq!(
            err.to_string(),
            "storage failure: lock wait timeout on player p1 after 50ms"
        );
    }
}
