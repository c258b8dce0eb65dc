//! Producer-facing entry points
//!
//! Each method corresponds to one request of the RPC surface. Punishments
//! are evaluated, persisted and only then published; a failed write means
//! nothing is broadcast, a failed broadcast is not rolled back.

use crate::gateway::{PersistenceGateway, PlayerProfile, StorageError};
use crate::logging::{log_request_end, log_request_error, log_request_start};
use crate::punish::{
    Identity, PunishError, PunishLevel, PunishRequest, PunishmentDecision, PunishmentEngine,
    PunishmentRecord, ReportEntry,
};
use crate::stream::{
    ActionPayload, GLOBAL_TARGET, Hub, PlayerEntry, PlayerPayload, PunishPayload, Subscription,
};
use crate::{DISPATCH_TARGET, PUNISH_TARGET};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Punish(PunishError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// Gateway failures surface as `Storage` whichever step hit them
impl From<PunishError> for DispatchError {
    fn from(error: PunishError) -> Self {
        match error {
            PunishError::Storage(error) => Self::Storage(error),
            error => Self::Punish(error),
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Answer to a punishment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PunishResponse {
    pub permitted: bool,
    pub decision: PunishmentDecision,
    /// Stored record, when permitted
    pub record: Option<PunishmentRecord>,
}

impl PunishResponse {
    fn no_profile() -> Self {
        Self {
            permitted: false,
            decision: PunishmentDecision {
                no_profile: true,
                ..Default::default()
            },
            record: None,
        }
    }
}

/// Request handlers shared by every connection
#[derive(Clone)]
pub struct Dispatcher {
    hub: Arc<Hub>,
    gateway: Arc<dyn PersistenceGateway>,
    engine: PunishmentEngine,
}

impl Dispatcher {
    pub fn new(hub: Arc<Hub>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            hub,
            gateway,
            engine: PunishmentEngine::new(),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Evaluate, record and broadcast a punishment
    ///
    /// The target uuid is resolved from the name when it is missing or when
    /// `force` is set. The event goes to the server the target is on, which
    /// then has to enforce it, or to every server when the target is offline.
    ///
    /// # Errors
    /// Returns an error if the gateway fails
    pub async fn set_player_punish(
        &self,
        mut request: PunishRequest,
    ) -> DispatchResult<PunishResponse> {
        let target = request.to.to_string();
        let started = log_request_start("set_player_punish", &target);

        let result = self.punish(&mut request).await;
        match &result {
            Ok(response) if response.permitted => {
                log_request_end("set_player_punish", &target, started, "permitted");
            }
            Ok(response) => {
                log_request_end("set_player_punish", &target, started, response.decision);
            }
            Err(e) => log_request_error("set_player_punish", &target, e),
        }
        result
    }

    async fn punish(&self, request: &mut PunishRequest) -> DispatchResult<PunishResponse> {
        if request.force || !request.to.has_uuid() {
            match self.gateway.find_uuid_by_name(&request.to.name).await? {
                Some(uuid) => request.to.uuid = uuid,
                // Forced against a uuid we hold no profile for
                None if request.to.has_uuid() => {}
                None => {
                    warn!(
                        target: PUNISH_TARGET,
                        name = %request.to.name,
                        "Failed to resolve player uuid"
                    );
                    return Ok(PunishResponse::no_profile());
                }
            }
        }

        let evaluation = self.engine.evaluate(self.gateway.as_ref(), request).await?;
        let record = match evaluation.record {
            Some(record) if evaluation.permitted => record,
            _ => {
                return Ok(PunishResponse {
                    permitted: false,
                    decision: evaluation.decision,
                    record: None,
                });
            }
        };

        self.gateway.record_punishment(&record).await?;

        info!(
            target: PUNISH_TARGET,
            level = %record.level,
            reason = %record.reason,
            expire = ?record.expire,
            punishment_id = %record.id,
            "[Punishment] {} -> {}",
            record.punisher.name,
            record.target.name
        );

        let (target, require_remote_execution) = match evaluation.current_server {
            Some(server) => (server, true),
            None => (GLOBAL_TARGET.to_string(), false),
        };
        let delivered = self
            .hub
            .publish_punish(target.as_str(), record.clone(), require_remote_execution);

        info!(
            target: DISPATCH_TARGET,
            target_name = %target,
            require_remote_execution,
            delivered,
            "Punishment published"
        );

        Ok(PunishResponse {
            permitted: true,
            decision: evaluation.decision,
            record: Some(record),
        })
    }

    /// Lift the latest active ban of a player
    ///
    /// Nothing is broadcast; servers learn about it from persistence.
    ///
    /// # Errors
    /// Returns an error if the target is empty, unknown, not banned, or the
    /// gateway fails
    pub async fn unban(&self, target: Identity) -> DispatchResult<PunishmentRecord> {
        let name = target.to_string();
        let started = log_request_start("unban", &name);

        let result = self.lift(target).await;
        match &result {
            Ok(record) => log_request_end("unban", &name, started, &record.id),
            Err(e) => log_request_error("unban", &name, e),
        }
        result
    }

    async fn lift(&self, target: Identity) -> DispatchResult<PunishmentRecord> {
        if target.is_empty() {
            return Err(PunishError::InvalidTarget.into());
        }

        let uuid = if target.has_uuid() {
            target.uuid
        } else {
            self.gateway
                .find_uuid_by_name(&target.name)
                .await?
                .ok_or(PunishError::PlayerNotFound(target.name))?
        };

        Ok(self.engine.revoke(self.gateway.as_ref(), &uuid).await?)
    }

    /// Store a player report and broadcast it to every server
    ///
    /// Without a `server` the reporter's current server is recorded.
    ///
    /// # Errors
    /// Returns an error if the gateway fails
    pub async fn report(
        &self,
        from: Identity,
        to: Identity,
        server: &str,
        message: &str,
    ) -> DispatchResult<ReportEntry> {
        let target = to.to_string();
        let started = log_request_start("report", &target);

        let result = self.file_report(from, to, server, message).await;
        match &result {
            Ok(report) => log_request_end("report", &target, started, &report.id),
            Err(e) => log_request_error("report", &target, e),
        }
        result
    }

    async fn file_report(
        &self,
        from: Identity,
        to: Identity,
        server: &str,
        message: &str,
    ) -> DispatchResult<ReportEntry> {
        let server = if server.is_empty() {
            self.gateway
                .find_player(&from.uuid)
                .await?
                .and_then(|profile| profile.server().map(str::to_string))
                .unwrap_or_default()
        } else {
            server.to_string()
        };

        let report = ReportEntry::new(from, to, message, Utc::now(), server);
        self.gateway.record_report(&report).await?;

        info!(
            target: PUNISH_TARGET,
            report_id = %report.id,
            server = %report.server,
            message = %report.message,
            "[Report] {} -> {}",
            report.from.name,
            report.to.name
        );

        let delivered = self.hub.publish_report(report.clone());
        info!(target: DISPATCH_TARGET, delivered, "Report published");

        Ok(report)
    }

    /// Punishment history of a player
    ///
    /// # Errors
    /// Returns an error if the gateway fails
    pub async fn player_punishments(
        &self,
        uuid: &str,
        min_level: PunishLevel,
        include_expired: bool,
    ) -> DispatchResult<Vec<PunishmentRecord>> {
        Ok(self
            .engine
            .history(self.gateway.as_ref(), uuid, min_level, include_expired)
            .await?)
    }

    /// Replace the groups of a player and notify the server they are on
    ///
    /// # Errors
    /// Returns an error if the player is unknown or the gateway fails
    pub async fn set_player_groups(
        &self,
        uuid: &str,
        groups: Vec<String>,
    ) -> DispatchResult<PlayerProfile> {
        self.gateway.set_player_groups(uuid, &groups).await?;

        let profile = self
            .gateway
            .find_player(uuid)
            .await?
            .ok_or_else(|| StorageError::RecordNotFound(uuid.to_string()))?;

        if let Some(server) = profile.server() {
            let delivered = self.hub.publish_player_groups(
                server,
                PlayerEntry {
                    uuid: uuid.to_string(),
                    groups,
                },
            );
            info!(
                target: DISPATCH_TARGET,
                uuid,
                server,
                delivered,
                "Player groups published"
            );
        }

        Ok(profile)
    }

    /// Record that a player joined a server
    ///
    /// # Errors
    /// Returns an error if the player is unknown or the gateway fails
    pub async fn set_player_server(&self, uuid: &str, server: &str) -> DispatchResult<()> {
        self.gateway
            .set_player_server(uuid, Some(server.to_string()))
            .await?;
        Ok(())
    }

    /// Record that a player left a server
    ///
    /// Ignored when the player has already moved to another server.
    ///
    /// # Errors
    /// Returns an error if the player is unknown or the gateway fails
    pub async fn remove_player_server(&self, uuid: &str, server: &str) -> DispatchResult<()> {
        let profile = self
            .gateway
            .find_player(uuid)
            .await?
            .ok_or_else(|| StorageError::RecordNotFound(uuid.to_string()))?;

        if profile.server() == Some(server) {
            self.gateway.set_player_server(uuid, None).await?;
        }
        Ok(())
    }

    pub fn announce(&self, target: &str, message: &str) -> usize {
        self.hub.announce(target, message)
    }

    pub fn dispatch(&self, target: &str, cmd: &str) -> usize {
        self.hub.dispatch(target, cmd)
    }

    /// Disconnect a consumer from every class
    pub fn quit(&self, name: &str) -> usize {
        self.hub.quit_all(name)
    }

    pub fn subscribe_action(&self, name: &str) -> Subscription<ActionPayload> {
        self.hub.subscribe(name)
    }

    pub fn subscribe_player(&self, name: &str) -> Subscription<PlayerPayload> {
        self.hub.subscribe(name)
    }

    pub fn subscribe_punish(&self, name: &str) -> Subscription<PunishPayload> {
        self.hub.subscribe(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryGateway, MockPersistenceGateway};
    use crate::stream::{EventBody, EventClass};
    use chrono::{Duration, Utc};

    const PLAYER: &str = "player-uuid";

    fn setup() -> (Dispatcher, MemoryGateway) {
        let gateway = MemoryGateway::new();
        let dispatcher = Dispatcher::new(Arc::new(Hub::default()), Arc::new(gateway.clone()));
        (dispatcher, gateway)
    }

    fn tempban(to: Identity) -> PunishRequest {
        PunishRequest::new(
            Identity::new("admin-uuid", "Admin"),
            to,
            PunishLevel::TempBan,
            "spam",
        )
        .expiring(Utc::now() + Duration::milliseconds(3_600_000))
    }

    #[tokio::test]
    async fn test_tempban_reaches_current_server_then_cools_down() {
        let (dispatcher, gateway) = setup();
        gateway.upsert_player(PlayerProfile::new(PLAYER, "PlayerX").on_server("lobby-1"));
        let mut lobby = dispatcher.subscribe_punish("lobby-1");

        let request = tempban(Identity::new(PLAYER, "PlayerX"));
        let response = dispatcher.set_player_punish(request.clone()).await.unwrap();
        assert!(response.permitted);
        assert!(response.decision.is_clear());

        let record = response.record.unwrap();
        assert_eq!(gateway.punishment(&record.id).map(|r| r.available), Some(true));

        let event = lobby.next_event().await.unwrap().unwrap();
        assert_eq!(event.target, "lobby-1");
        assert_eq!(event.kind(), "PUNISH");
        assert_eq!(
            event.body,
            EventBody::Deliver(PunishPayload::Punish {
                entry: record,
                require_remote_execution: true,
            })
        );

        let again = dispatcher.set_player_punish(request).await.unwrap();
        assert!(!again.permitted);
        assert!(again.decision.cooldown);
        assert!(again.record.is_none());
        assert_eq!(gateway.punishment_count(), 1);
    }

    #[tokio::test]
    async fn test_offline_ban_is_global() {
        let (dispatcher, gateway) = setup();
        gateway.upsert_player(PlayerProfile::new(PLAYER, "PlayerX"));
        let mut survival = dispatcher.subscribe_punish("survival");

        // Resolved by name
        let response = dispatcher
            .set_player_punish(tempban(Identity::named("playerx")))
            .await
            .unwrap();
        assert!(response.permitted);
        assert!(response.decision.offline);
        assert_eq!(response.record.as_ref().map(|r| r.target.uuid.as_str()), Some(PLAYER));

        let event = survival.next_event().await.unwrap().unwrap();
        assert_eq!(event.target, GLOBAL_TARGET);
        assert_eq!(
            event.payload().map(PunishPayload::requires_remote_execution),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_unknown_name_is_no_profile() {
        let (dispatcher, gateway) = setup();
        let _lobby = dispatcher.subscribe_punish("lobby-1");

        let response = dispatcher
            .set_player_punish(tempban(Identity::named("Nobody")).forced(true))
            .await
            .unwrap();
        assert_eq!(response, PunishResponse::no_profile());
        assert_eq!(gateway.punishment_count(), 0);
    }

    #[tokio::test]
    async fn test_force_punishes_player_without_profile() {
        let (dispatcher, gateway) = setup();
        let mut lobby = dispatcher.subscribe_punish("lobby-1");

        let mut request = tempban(Identity::new("unseen-uuid", "Unseen"));
        request.level = PunishLevel::Kick;

        let rejected = dispatcher.set_player_punish(request.clone()).await.unwrap();
        assert!(!rejected.permitted);
        assert!(rejected.decision.no_profile);

        let forced = dispatcher.set_player_punish(request.forced(true)).await.unwrap();
        assert!(forced.permitted);
        assert!(forced.decision.no_profile);
        assert_eq!(gateway.punishment_count(), 1);

        let event = lobby.next_event().await.unwrap().unwrap();
        assert_eq!(event.target, GLOBAL_TARGET);
    }

    #[tokio::test]
    async fn test_nothing_published_when_persist_fails() {
        let mut gateway = MockPersistenceGateway::new();
        gateway.expect_find_punishments().returning(|_, _, _| Ok(Vec::new()));
        gateway
            .expect_find_player()
            .returning(|_| Ok(Some(PlayerProfile::new(PLAYER, "PlayerX").on_server("lobby-1"))));
        gateway
            .expect_record_punishment()
            .times(1)
            .returning(|_| Err(StorageError::Backend("disk full".to_string())));

        let hub = Arc::new(Hub::default());
        let dispatcher = Dispatcher::new(Arc::clone(&hub), Arc::new(gateway));
        let lobby = dispatcher.subscribe_punish("lobby-1");

        let result = dispatcher
            .set_player_punish(tempban(Identity::new(PLAYER, "PlayerX")))
            .await;
        assert!(matches!(result, Err(DispatchError::Storage(_))));

        hub.close();
        let received: Vec<_> = futures::StreamExt::collect(lobby).await;
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_unban() {
        let (dispatcher, gateway) = setup();
        gateway.upsert_player(PlayerProfile::new(PLAYER, "PlayerX").on_server("lobby-1"));
        let response = dispatcher
            .set_player_punish(tempban(Identity::new(PLAYER, "PlayerX")))
            .await
            .unwrap();
        let banned = response.record.unwrap();

        assert!(matches!(
            dispatcher.unban(Identity::default()).await,
            Err(DispatchError::Punish(PunishError::InvalidTarget))
        ));
        assert!(matches!(
            dispatcher.unban(Identity::named("Nobody")).await,
            Err(DispatchError::Punish(PunishError::PlayerNotFound(_)))
        ));

        let lifted = dispatcher.unban(Identity::named("PlayerX")).await.unwrap();
        assert_eq!(lifted.id, banned.id);
        assert_eq!(gateway.punishment(&banned.id).map(|r| r.available), Some(false));

        assert!(matches!(
            dispatcher.unban(Identity::new(PLAYER, "PlayerX")).await,
            Err(DispatchError::Punish(PunishError::NotPunished(_)))
        ));

        // Ban can be issued again once lifted
        let response = dispatcher
            .set_player_punish(tempban(Identity::new(PLAYER, "PlayerX")))
            .await
            .unwrap();
        assert!(response.permitted);
    }

    #[tokio::test]
    async fn test_player_punishments() {
        let (dispatcher, gateway) = setup();
        gateway.upsert_player(PlayerProfile::new(PLAYER, "PlayerX").on_server("lobby-1"));

        let mut kick = tempban(Identity::new(PLAYER, "PlayerX"));
        kick.level = PunishLevel::Kick;
        dispatcher.set_player_punish(kick).await.unwrap();
        dispatcher
            .set_player_punish(tempban(Identity::new(PLAYER, "PlayerX")))
            .await
            .unwrap();

        let all = dispatcher
            .player_punishments(PLAYER, PunishLevel::Warn, false)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let bans = dispatcher
            .player_punishments(PLAYER, PunishLevel::TempBan, false)
            .await
            .unwrap();
        assert_eq!(bans.len(), 1);
    }

    #[tokio::test]
    async fn test_set_player_groups() {
        let (dispatcher, gateway) = setup();
        gateway.upsert_player(PlayerProfile::new(PLAYER, "PlayerX"));
        let mut lobby = dispatcher.subscribe_player("lobby-1");
        let groups = vec!["vip".to_string()];

        // Offline: stored, nothing published
        let profile = dispatcher.set_player_groups(PLAYER, groups.clone()).await.unwrap();
        assert_eq!(profile.groups, groups);

        dispatcher.set_player_server(PLAYER, "lobby-1").await.unwrap();
        let groups = vec!["vip".to_string(), "builder".to_string()];
        dispatcher.set_player_groups(PLAYER, groups.clone()).await.unwrap();

        let event = lobby.next_event().await.unwrap().unwrap();
        assert_eq!(event.target, "lobby-1");
        assert_eq!(
            event.payload(),
            Some(&PlayerPayload::Groups(PlayerEntry {
                uuid: PLAYER.to_string(),
                groups,
            }))
        );

        assert!(matches!(
            dispatcher.set_player_groups("missing", Vec::new()).await,
            Err(DispatchError::Storage(StorageError::RecordNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_player_server_tracking() {
        let (dispatcher, gateway) = setup();
        gateway.upsert_player(PlayerProfile::new(PLAYER, "PlayerX"));

        dispatcher.set_player_server(PLAYER, "lobby-1").await.unwrap();
        dispatcher.set_player_server(PLAYER, "survival").await.unwrap();

        // Stale leave from the previous server
        dispatcher.remove_player_server(PLAYER, "lobby-1").await.unwrap();
        let profile = gateway.find_player(PLAYER).await.unwrap().unwrap();
        assert_eq!(profile.server(), Some("survival"));

        dispatcher.remove_player_server(PLAYER, "survival").await.unwrap();
        let profile = gateway.find_player(PLAYER).await.unwrap().unwrap();
        assert!(!profile.is_online());
    }

    #[tokio::test]
    async fn test_storage_errors_share_one_variant() {
        let mut gateway = MockPersistenceGateway::new();
        gateway
            .expect_find_punishments()
            .times(1)
            .returning(|_, _, _| Err(StorageError::Backend("timeout".to_string())));
        let dispatcher = Dispatcher::new(Arc::new(Hub::default()), Arc::new(gateway));

        // Failure during evaluation, before anything is written
        let result = dispatcher
            .set_player_punish(tempban(Identity::new(PLAYER, "PlayerX")))
            .await;
        assert!(matches!(
            result,
            Err(DispatchError::Storage(StorageError::Backend(_)))
        ));

        let error = DispatchError::from(PunishError::InvalidTarget);
        assert!(matches!(error, DispatchError::Punish(PunishError::InvalidTarget)));
    }

    #[tokio::test]
    async fn test_report_is_stored_and_broadcast() {
        let (dispatcher, gateway) = setup();
        gateway.upsert_player(PlayerProfile::new("reporter-uuid", "Alex").on_server("lobby-2"));
        let mut survival = dispatcher.subscribe_punish("survival");

        let report = dispatcher
            .report(
                Identity::new("reporter-uuid", "Alex"),
                Identity::new(PLAYER, "PlayerX"),
                "",
                "flying",
            )
            .await
            .unwrap();
        assert_eq!(report.server, "lobby-2");
        assert_eq!(gateway.reports_against(PLAYER), vec![report.clone()]);

        let event = survival.next_event().await.unwrap().unwrap();
        assert_eq!(event.target, GLOBAL_TARGET);
        assert_eq!(event.kind(), "REPORT");
        assert_eq!(event.payload(), Some(&PunishPayload::Report(report)));

        // An explicit server wins over presence
        let report = dispatcher
            .report(
                Identity::new("unknown-uuid", "Ghost"),
                Identity::new(PLAYER, "PlayerX"),
                "creative",
                "griefing",
            )
            .await
            .unwrap();
        assert_eq!(report.server, "creative");
        assert_eq!(gateway.report_count(), 2);
    }

    #[tokio::test]
    async fn test_report_not_published_when_persist_fails() {
        let mut gateway = MockPersistenceGateway::new();
        gateway.expect_find_player().never();
        gateway
            .expect_record_report()
            .times(1)
            .returning(|_| Err(StorageError::Backend("disk full".to_string())));

        let hub = Arc::new(Hub::default());
        let dispatcher = Dispatcher::new(Arc::clone(&hub), Arc::new(gateway));
        let lobby = dispatcher.subscribe_punish("lobby-1");

        let result = dispatcher
            .report(
                Identity::new("reporter-uuid", "Alex"),
                Identity::new(PLAYER, "PlayerX"),
                "lobby-1",
                "flying",
            )
            .await;
        assert!(matches!(result, Err(DispatchError::Storage(_))));

        hub.close();
        let received: Vec<_> = futures::StreamExt::collect(lobby).await;
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_passthroughs() {
        let (dispatcher, _gateway) = setup();
        let mut lobby = dispatcher.subscribe_action("lobby-1");
        let _player = dispatcher.subscribe_player("lobby-1");

        assert_eq!(dispatcher.announce(GLOBAL_TARGET, "hello"), 1);
        assert_eq!(dispatcher.dispatch("lobby-1", "say hi"), 1);

        let event = lobby.next_event().await.unwrap().unwrap();
        assert_eq!(
            event.payload(),
            Some(&ActionPayload::Announce {
                message: "hello".to_string()
            })
        );
        let event = lobby.next_event().await.unwrap().unwrap();
        assert_eq!(
            event.payload(),
            Some(&ActionPayload::Dispatch {
                cmd: "say hi".to_string()
            })
        );

        assert_eq!(dispatcher.quit("lobby-1"), 2);
        assert!(lobby.next_event().await.is_none());
        assert_eq!(dispatcher.hub().consumer_count(EventClass::Action), 0);
    }
}
