//! Punishment system
//!
//! Decides whether a moderation action (warn, kick, temporary or permanent
//! ban) may be recorded against a player, given the player's active bans and
//! whether they are connected. The history itself lives behind the
//! [`PersistenceGateway`](crate::gateway::PersistenceGateway).

mod decision;
mod engine;
mod error;
mod level;
mod record;

pub use decision::PunishmentDecision;
pub use engine::{Evaluation, PunishRequest, PunishmentEngine};
pub use error::{PunishError, PunishResult};
pub use level::PunishLevel;
pub use record::{Identity, PunishmentRecord, ReportEntry};
