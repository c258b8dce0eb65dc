use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a punishment request was or was not permitted
///
/// The flags are independent so a caller can report exactly which
/// precondition failed and decide whether to retry with `force`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentDecision {
    /// Target has no stored profile
    pub no_profile: bool,
    /// Target already has an active permanent ban
    pub duplicate: bool,
    /// Target has an active temporary ban
    pub cooldown: bool,
    /// Target is not connected to any server
    pub offline: bool,
}

impl PunishmentDecision {
    /// No flag is set
    #[must_use]
    pub fn is_clear(&self) -> bool {
        !(self.no_profile || self.duplicate || self.cooldown || self.offline)
    }

    /// Names of the flags that are set
    #[must_use]
    pub fn reasons(&self) -> Vec<&'static str> {
        [
            (self.no_profile, "no_profile"),
            (self.duplicate, "duplicate"),
            (self.cooldown, "cooldown"),
            (self.offline, "offline"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

impl fmt::Display for PunishmentDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clear() {
            write!(f, "clear")
        } else {
            write!(f, "{}", self.reasons().join(", "))
        }
    }
}
