//! Persistence gateway
//!
//! The hub and the punishment engine never talk to a database directly.
//! Everything they read or write goes through [`PersistenceGateway`], which
//! a deployment backs with whatever store it uses. [`MemoryGateway`] is the
//! bundled implementation.

mod memory;

pub use memory::MemoryGateway;

use crate::punish::{PunishLevel, PunishmentRecord, ReportEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend rejected or failed the operation
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Addressed record does not exist
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Snapshot file could not be read or written
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot file is malformed
    #[error("snapshot format error: {0}")]
    Format(#[from] serde_yaml::Error),
}

/// Result type for gateway operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stored player profile, as far as this service needs it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
    /// Server the player is connected to, `None` when offline
    #[serde(default)]
    pub current_server: Option<String>,
}

impl PlayerProfile {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the server the player is connected to
    #[must_use]
    pub fn on_server(mut self, server: impl Into<String>) -> Self {
        self.current_server = Some(server.into());
        self
    }

    /// Name of the server the player is on, if any
    #[must_use]
    pub fn server(&self) -> Option<&str> {
        self.current_server.as_deref().filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.server().is_some()
    }
}

/// Storage operations consumed by the punishment engine and the dispatcher
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Look up a profile by uuid
    async fn find_player(&self, uuid: &str) -> StorageResult<Option<PlayerProfile>>;

    /// Resolve a player name (case-insensitive) to a uuid
    async fn find_uuid_by_name(&self, name: &str) -> StorageResult<Option<String>>;

    /// Punishment history of a player at `min_level` or above, oldest first.
    ///
    /// Unless `include_expired` is set, only records that are available and
    /// not past their expiry are returned.
    async fn find_punishments(
        &self,
        target_uuid: &str,
        min_level: PunishLevel,
        include_expired: bool,
    ) -> StorageResult<Vec<PunishmentRecord>>;

    /// Append a new record
    async fn record_punishment(&self, record: &PunishmentRecord) -> StorageResult<()>;

    /// Replace a stored record, matched by id
    async fn update_punishment(&self, record: &PunishmentRecord) -> StorageResult<()>;

    /// Replace the group list of a player
    async fn set_player_groups(&self, uuid: &str, groups: &[String]) -> StorageResult<()>;

    /// Record which server a player is on, `None` when they disconnect
    async fn set_player_server(&self, uuid: &str, server: Option<String>) -> StorageResult<()>;

    /// Append a player report
    async fn record_report(&self, report: &ReportEntry) -> StorageResult<()>;
}
