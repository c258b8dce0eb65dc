//! Punishment records, player reports and player identities
//!
//! Records are append-only: once stored, the only mutation is flipping
//! `available` to false when a ban is lifted. The history doubles as the
//! audit trail.

use crate::punish::{PunishError, PunishLevel, PunishResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// Snapshot of a player identity at the time a record was written
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Player UUID, may be empty when only the name is known
    pub uuid: String,
    /// Display name
    pub name: String,
}

impl Identity {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
        }
    }

    /// Identity known only by name
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    #[must_use]
    pub fn has_uuid(&self) -> bool {
        !self.uuid.is_empty()
    }

    /// Neither uuid nor name is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uuid.is_empty() && self.name.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uuid.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.uuid)
        }
    }
}

/// A stored moderation action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentRecord {
    /// Unique ID of this record
    pub id: String,
    /// False once the punishment has been lifted
    pub available: bool,
    pub level: PunishLevel,
    pub reason: String,
    /// When the punishment was issued
    pub date: DateTime<Utc>,
    /// When the punishment stops applying, `None` for no expiry
    pub expire: Option<DateTime<Utc>>,
    /// Who issued the punishment
    pub punisher: Identity,
    /// Who received the punishment
    pub target: Identity,
}

impl PunishmentRecord {
    /// Create a new available record
    pub fn new(
        level: PunishLevel,
        reason: impl Into<String>,
        date: DateTime<Utc>,
        expire: Option<DateTime<Utc>>,
        punisher: Identity,
        target: Identity,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            available: true,
            level,
            reason: reason.into(),
            date,
            expire,
            punisher,
            target,
        }
    }

    /// Available and not yet expired at `now`
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.available && self.expire.is_none_or(|expire| expire >= now)
    }

    /// Lift this punishment
    ///
    /// # Errors
    /// Returns an error if the record is already unavailable
    pub fn revoke(&mut self) -> PunishResult<()> {
        if !self.available {
            return Err(PunishError::AlreadyRevoked(self.id.clone()));
        }

        self.available = false;

        info!(
            target: crate::PUNISH_TARGET,
            punishment_id = %self.id,
            level = %self.level,
            target_player = %self.target,
            "Punishment revoked"
        );

        Ok(())
    }
}

/// A player report filed for moderators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: String,
    /// Reporting player
    pub from: Identity,
    /// Reported player
    pub to: Identity,
    pub message: String,
    pub date: DateTime<Utc>,
    /// Server the report was filed from, empty when unknown
    pub server: String,
}

impl ReportEntry {
    pub fn new(
        from: Identity,
        to: Identity,
        message: impl Into<String>,
        date: DateTime<Utc>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            message: message.into(),
            date,
            server: server.into(),
        }
    }
}
