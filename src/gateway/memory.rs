//! In-memory persistence gateway
//!
//! Backed by concurrent maps and persisted as a single YAML snapshot.

use crate::gateway::{PersistenceGateway, PlayerProfile, StorageError, StorageResult};
use crate::punish::{PunishLevel, PunishmentRecord, ReportEntry};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// On-disk layout of a gateway snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    players: Vec<PlayerProfile>,
    #[serde(default)]
    punishments: Vec<PunishmentRecord>,
    #[serde(default)]
    reports: Vec<ReportEntry>,
}

/// Gateway that keeps players, punishments and reports in memory
#[derive(Clone, Default)]
pub struct MemoryGateway {
    /// Map of uuid -> profile
    players: Arc<DashMap<String, PlayerProfile>>,
    /// Map of record id -> punishment
    punishments: Arc<DashMap<String, PunishmentRecord>>,
    /// Map of report id -> report
    reports: Arc<DashMap<String, ReportEntry>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot from a YAML file
    ///
    /// A missing file yields an empty gateway.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let gateway = Self::new();

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No gateway snapshot found, starting empty");
                return Ok(gateway);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_yaml::from_str(&content)?;
        for profile in snapshot.players {
            gateway.players.insert(profile.uuid.clone(), profile);
        }
        for record in snapshot.punishments {
            gateway.punishments.insert(record.id.clone(), record);
        }
        for report in snapshot.reports {
            gateway.reports.insert(report.id.clone(), report);
        }

        info!(
            path = %path.display(),
            players = gateway.players.len(),
            punishments = gateway.punishments.len(),
            reports = gateway.reports.len(),
            "Gateway snapshot loaded"
        );
        Ok(gateway)
    }

    /// Write a snapshot to a YAML file, creating the parent directory
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written
    pub async fn save(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut punishments: Vec<PunishmentRecord> = self
            .punishments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        punishments.sort_by_key(|record| record.date);

        let mut reports: Vec<ReportEntry> = self
            .reports
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        reports.sort_by_key(|report| report.date);

        let snapshot = Snapshot {
            players: self
                .players
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
            punishments,
            reports,
        };

        let yaml = serde_yaml::to_string(&snapshot)?;
        tokio::fs::write(path, yaml).await?;

        info!(
            path = %path.display(),
            players = snapshot.players.len(),
            punishments = snapshot.punishments.len(),
            reports = snapshot.reports.len(),
            "Gateway snapshot saved"
        );
        Ok(())
    }

    /// Insert or replace a profile
    pub fn upsert_player(&self, profile: PlayerProfile) {
        self.players.insert(profile.uuid.clone(), profile);
    }

    /// Get a punishment by record id
    pub fn punishment(&self, id: &str) -> Option<PunishmentRecord> {
        self.punishments.get(id).map(|entry| entry.value().clone())
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn punishment_count(&self) -> usize {
        self.punishments.len()
    }

    /// Stored reports against a player, oldest first
    pub fn reports_against(&self, uuid: &str) -> Vec<ReportEntry> {
        let mut reports: Vec<ReportEntry> = self
            .reports
            .iter()
            .filter(|entry| entry.value().to.uuid == uuid)
            .map(|entry| entry.value().clone())
            .collect();
        reports.sort_by_key(|report| report.date);
        reports
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn find_player(&self, uuid: &str) -> StorageResult<Option<PlayerProfile>> {
        Ok(self.players.get(uuid).map(|entry| entry.value().clone()))
    }

    async fn find_uuid_by_name(&self, name: &str) -> StorageResult<Option<String>> {
        let name = name.to_lowercase();
        Ok(self
            .players
            .iter()
            .find(|entry| entry.value().name.to_lowercase() == name)
            .map(|entry| entry.key().clone()))
    }

    async fn find_punishments(
        &self,
        target_uuid: &str,
        min_level: PunishLevel,
        include_expired: bool,
    ) -> StorageResult<Vec<PunishmentRecord>> {
        let now = Utc::now();
        let mut records: Vec<PunishmentRecord> = self
            .punishments
            .iter()
            .filter_map(|entry| {
                let record = entry.value();
                if record.target.uuid == target_uuid
                    && record.level >= min_level
                    && (include_expired || record.is_active(now))
                {
                    Some(record.clone())
                } else {
                    None
                }
            })
            .collect();

        records.sort_by_key(|record| record.date);
        Ok(records)
    }

    async fn record_punishment(&self, record: &PunishmentRecord) -> StorageResult<()> {
        if self.punishments.contains_key(&record.id) {
            return Err(StorageError::Backend(format!(
                "punishment {} already exists",
                record.id
            )));
        }
        self.punishments.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_punishment(&self, record: &PunishmentRecord) -> StorageResult<()> {
        let mut stored = self
            .punishments
            .get_mut(&record.id)
            .ok_or_else(|| StorageError::RecordNotFound(record.id.clone()))?;
        *stored = record.clone();
        Ok(())
    }

    async fn set_player_groups(&self, uuid: &str, groups: &[String]) -> StorageResult<()> {
        let mut profile = self
            .players
            .get_mut(uuid)
            .ok_or_else(|| StorageError::RecordNotFound(uuid.to_string()))?;
        profile.groups = groups.to_vec();
        Ok(())
    }

    async fn set_player_server(&self, uuid: &str, server: Option<String>) -> StorageResult<()> {
        let mut profile = self
            .players
            .get_mut(uuid)
            .ok_or_else(|| StorageError::RecordNotFound(uuid.to_string()))?;
        profile.current_server = server;
        Ok(())
    }

    async fn record_report(&self, report: &ReportEntry) -> StorageResult<()> {
        if self.reports.contains_key(&report.id) {
            return Err(StorageError::Backend(format!(
                "report {} already exists",
                report.id
            )));
        }
        self.reports.insert(report.id.clone(), report.clone());
        Ok(())
    }
}
