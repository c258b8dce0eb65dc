//! Punishment severity levels
//!
//! Levels are totally ordered so history queries can filter with a minimum
//! severity (`level >= TEMPBAN` selects every ban).

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Severity of a moderation action, ordered from least to most severe
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum PunishLevel {
    /// Warning delivered to the player in game
    #[display("WARN")]
    Warn,
    /// Removal from the current server
    #[display("KICK")]
    Kick,
    /// Ban with an expiry date
    #[display("TEMPBAN")]
    TempBan,
    /// Ban without an expiry date
    #[display("PERMBAN")]
    PermBan,
}

impl PunishLevel {
    /// Every level, least severe first
    pub const ALL: [Self; 4] = [Self::Warn, Self::Kick, Self::TempBan, Self::PermBan];

    /// Whether this level is a ban of either kind
    #[must_use]
    pub fn is_ban(self) -> bool {
        self >= Self::TempBan
    }

    /// Whether the target has to be connected for the action to take effect
    #[must_use]
    pub fn requires_presence(self) -> bool {
        matches!(self, Self::Warn | Self::Kick)
    }
}
