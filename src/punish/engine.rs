//! Punishment authorization
//!
//! The engine holds no state. Every evaluation reads the target's history and
//! profile through the gateway, accumulates [`PunishmentDecision`] flags and
//! applies the gating rules in a fixed order. A permitted evaluation hands
//! back the record to persist; writing it is the caller's job.

use crate::gateway::PersistenceGateway;
use crate::punish::{
    Identity, PunishError, PunishLevel, PunishResult, PunishmentDecision, PunishmentRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A requested punishment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishRequest {
    /// Bypass the profile and presence checks
    #[serde(default)]
    pub force: bool,
    pub from: Identity,
    pub to: Identity,
    pub level: PunishLevel,
    pub reason: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
}

impl PunishRequest {
    pub fn new(
        from: Identity,
        to: Identity,
        level: PunishLevel,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            force: false,
            from,
            to,
            level,
            reason: reason.into(),
            date: Utc::now(),
            expire: None,
        }
    }

    #[must_use]
    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn expiring(mut self, expire: DateTime<Utc>) -> Self {
        self.expire = Some(expire);
        self
    }
}

/// Outcome of [`PunishmentEngine::evaluate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub permitted: bool,
    pub decision: PunishmentDecision,
    /// Record to persist, present only when permitted
    pub record: Option<PunishmentRecord>,
    /// Server the target is on, used for remote enforcement
    pub current_server: Option<String>,
}

impl Evaluation {
    fn rejected(decision: PunishmentDecision, current_server: Option<String>) -> Self {
        Self {
            permitted: false,
            decision,
            record: None,
            current_server,
        }
    }
}

/// Decides whether punishments may be recorded and which ban to lift
#[derive(Debug, Clone, Copy, Default)]
pub struct PunishmentEngine;

impl PunishmentEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a request against the target's current state
    ///
    /// # Errors
    /// Returns an error only when the gateway fails; rejections are reported
    /// through the returned decision
    pub async fn evaluate(
        &self,
        gateway: &dyn PersistenceGateway,
        request: &PunishRequest,
    ) -> PunishResult<Evaluation> {
        self.evaluate_at(gateway, request, Utc::now()).await
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit clock
    pub async fn evaluate_at(
        &self,
        gateway: &dyn PersistenceGateway,
        request: &PunishRequest,
        now: DateTime<Utc>,
    ) -> PunishResult<Evaluation> {
        let target_uuid = request.to.uuid.as_str();
        let mut decision = PunishmentDecision::default();

        let bans = gateway
            .find_punishments(target_uuid, PunishLevel::TempBan, false)
            .await?;
        for ban in bans.iter().filter(|ban| ban.is_active(now)) {
            if ban.level == PunishLevel::PermBan {
                decision.duplicate = true;
            }
            if request.level <= PunishLevel::TempBan && ban.level == PunishLevel::TempBan {
                decision.cooldown = true;
            }
        }

        let current_server = match gateway.find_player(target_uuid).await? {
            None => {
                decision.no_profile = true;
                None
            }
            Some(profile) => {
                let server = profile.server().map(str::to_string);
                decision.offline = server.is_none();
                server
            }
        };

        let rejected = (decision.no_profile && !request.force)
            || decision.duplicate
            || (decision.cooldown && request.level == PunishLevel::TempBan)
            || (decision.offline && !request.force && request.level.requires_presence());

        if rejected {
            debug!(
                target: crate::PUNISH_TARGET,
                level = %request.level,
                target_player = %request.to,
                decision = %decision,
                force = request.force,
                "Punishment rejected"
            );
            return Ok(Evaluation::rejected(decision, current_server));
        }

        let record = PunishmentRecord::new(
            request.level,
            request.reason.clone(),
            request.date,
            request.expire,
            request.from.clone(),
            request.to.clone(),
        );

        Ok(Evaluation {
            permitted: true,
            decision,
            record: Some(record),
            current_server,
        })
    }

    /// Lift the most recent active ban of a player and persist the change
    ///
    /// # Errors
    /// Returns [`PunishError::NotPunished`] if the player has no active ban
    pub async fn revoke(
        &self,
        gateway: &dyn PersistenceGateway,
        target_uuid: &str,
    ) -> PunishResult<PunishmentRecord> {
        let now = Utc::now();
        let mut latest = gateway
            .find_punishments(target_uuid, PunishLevel::TempBan, false)
            .await?
            .into_iter()
            .filter(|ban| ban.is_active(now))
            .max_by_key(|ban| ban.date)
            .ok_or_else(|| PunishError::NotPunished(target_uuid.to_string()))?;

        latest.revoke()?;
        gateway.update_punishment(&latest).await?;

        info!(
            target: crate::PUNISH_TARGET,
            target_uuid,
            punishment_id = %latest.id,
            "[UnBan] Ban lifted"
        );

        Ok(latest)
    }

    /// Punishment history of a player
    pub async fn history(
        &self,
        gateway: &dyn PersistenceGateway,
        target_uuid: &str,
        min_level: PunishLevel,
        include_expired: bool,
    ) -> PunishResult<Vec<PunishmentRecord>> {
        Ok(gateway
            .find_punishments(target_uuid, min_level, include_expired)
            .await?)
    }
}
