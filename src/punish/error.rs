//! Error types for the punishment system

use crate::gateway::StorageError;
use thiserror::Error;

/// Errors that can occur while evaluating or revoking punishments
///
/// Rejections are not errors: a refused punishment is reported through
/// [`PunishmentDecision`](super::PunishmentDecision) flags.
#[derive(Debug, Error)]
pub enum PunishError {
    /// Target has no active ban to lift
    #[error("player not punished: {0}")]
    NotPunished(String),

    /// Target name could not be resolved to a known player
    #[error("player not found: {0}")]
    PlayerNotFound(String),

    /// Request carried neither a uuid nor a name
    #[error("target does not have name / uuid")]
    InvalidTarget,

    /// Record was already made unavailable
    #[error("punishment already revoked: {0}")]
    AlreadyRevoked(String),

    /// Persistence gateway failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for punishment operations
pub type PunishResult<T> = Result<T, PunishError>;
