//! Active-procedure registry: identity-keyed merge, persistence and the
//! optional staleness policy with its removal archive.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use dre_core::{DetailField, IdentityKey, ProcedureRecord};
use dre_storage::{read_json_opt, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// At most one record per identity key; iteration order is key order.
pub type ActiveRegistry = BTreeMap<IdentityKey, ProcedureRecord>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub inserted: usize,
    pub refreshed: usize,
    pub retained: usize,
}

pub struct RegistryMerger;

impl RegistryMerger {
    /// Latest record wins on a shared identity; registry entries absent from
    /// `fresh` are kept untouched.
    pub fn merge(
        mut registry: ActiveRegistry,
        fresh: impl IntoIterator<Item = ProcedureRecord>,
    ) -> (ActiveRegistry, MergeStats) {
        let original: BTreeSet<IdentityKey> = registry.keys().cloned().collect();
        let mut refreshed = BTreeSet::new();
        let mut inserted = BTreeSet::new();

        for record in fresh {
            let key = record.identity_key();
            if original.contains(&key) {
                refreshed.insert(key.clone());
            } else {
                inserted.insert(key.clone());
            }
            registry.insert(key, record);
        }

        let stats = MergeStats {
            inserted: inserted.len(),
            refreshed: refreshed.len(),
            retained: original.len() - refreshed.len(),
        };
        (registry, stats)
    }
}

pub fn registry_from_records(records: impl IntoIterator<Item = ProcedureRecord>) -> ActiveRegistry {
    RegistryMerger::merge(ActiveRegistry::new(), records).0
}

/// When, if ever, a registry entry stops being active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalenessPolicy {
    #[default]
    Retain,
    /// Drop entries whose proposal deadline is more than `grace_days` in the past.
    DeadlinePassed { grace_days: u32 },
}

impl StalenessPolicy {
    /// `retain`, `deadline` or `deadline:<grace_days>`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim().to_ascii_lowercase();
        match input.split_once(':') {
            None if input == "retain" => Ok(StalenessPolicy::Retain),
            None if input == "deadline" => Ok(StalenessPolicy::DeadlinePassed { grace_days: 0 }),
            Some(("deadline", days)) => {
                let grace_days = days
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("invalid grace days in staleness policy {input:?}"))?;
                Ok(StalenessPolicy::DeadlinePassed { grace_days })
            }
            _ => bail!("unknown staleness policy {input:?} (expected retain or deadline:<days>)"),
        }
    }

    /// Removes expired entries from `registry` and returns them. Entries with
    /// no parsable deadline are never removed.
    pub fn prune(&self, registry: &mut ActiveRegistry, now: DateTime<Utc>) -> Vec<ExpiredRecord> {
        let StalenessPolicy::DeadlinePassed { grace_days } = *self else {
            return Vec::new();
        };
        let today = now.date_naive();

        let expired_keys: Vec<IdentityKey> = registry
            .iter()
            .filter(|(_, record)| {
                record
                    .detail_value(DetailField::ProposalDeadline)
                    .and_then(parse_deadline)
                    .and_then(|deadline| deadline.checked_add_days(Days::new(u64::from(grace_days))))
                    .is_some_and(|last_active_day| last_active_day < today)
            })
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| registry.remove(&key))
            .map(|record| ExpiredRecord {
                removed_at: now,
                reason: format!("proposal deadline passed (grace {grace_days} days)"),
                record,
            })
            .collect()
    }
}

/// Date part of a gazette deadline (`DD-MM-YYYY HH:MM` or `DD-MM-YYYY`).
pub fn parse_deadline(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(at) = NaiveDateTime::parse_from_str(value, "%d-%m-%Y %H:%M") {
        return Some(at.date());
    }
    let first = value.split_whitespace().next()?;
    NaiveDate::parse_from_str(first, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(first, "%d/%m/%Y"))
        .ok()
}

/// Archive entry for a record removed from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredRecord {
    pub removed_at: DateTime<Utc>,
    pub reason: String,
    pub record: ProcedureRecord,
}

/// File-backed registry under `<output>/data/`.
#[derive(Debug, Clone)]
pub struct RegistryManager {
    data_dir: PathBuf,
}

impl RegistryManager {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: output_dir.as_ref().join("data"),
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("ativos.json")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join("expirados.json")
    }

    /// Records of a dated snapshot file.
    pub async fn update_from_date_file(&self, path: &Path) -> Result<Vec<ProcedureRecord>> {
        read_json_opt::<Vec<ProcedureRecord>>(path)
            .await?
            .with_context(|| format!("dated snapshot {} does not exist", path.display()))
    }

    /// Persisted registry, empty when none has been saved yet.
    pub async fn load(&self) -> Result<ActiveRegistry> {
        let path = self.registry_path();
        let records: Option<Vec<ProcedureRecord>> = read_json_opt(&path).await?;
        Ok(registry_from_records(records.unwrap_or_default()))
    }

    pub async fn merge_with_existing(
        &self,
        new_records: Vec<ProcedureRecord>,
    ) -> Result<(ActiveRegistry, MergeStats)> {
        let existing = self.load().await?;
        let (registry, stats) = RegistryMerger::merge(existing, new_records);
        info!(
            inserted = stats.inserted,
            refreshed = stats.refreshed,
            retained = stats.retained,
            total = registry.len(),
            "registry merged"
        );
        Ok((registry, stats))
    }

    pub async fn save(&self, registry: &ActiveRegistry) -> Result<PathBuf> {
        let path = self.registry_path();
        let records: Vec<&ProcedureRecord> = registry.values().collect();
        write_json_atomic(&path, &records)
            .await
            .with_context(|| format!("saving registry {}", path.display()))?;
        Ok(path)
    }

    /// Applies `policy` and archives what it removed. If the archive cannot be
    /// written the removed entries are put back and the error is returned.
    pub async fn prune(
        &self,
        registry: &mut ActiveRegistry,
        policy: StalenessPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredRecord>> {
        let expired = policy.prune(registry, now);
        if expired.is_empty() {
            return Ok(expired);
        }

        if let Err(err) = self.append_to_archive(&expired).await {
            warn!(error = %err, count = expired.len(), "archiving expired entries failed; keeping them");
            for entry in expired {
                registry.insert(entry.record.identity_key(), entry.record);
            }
            return Err(err);
        }
        info!(count = expired.len(), "expired entries archived");
        Ok(expired)
    }

    async fn append_to_archive(&self, expired: &[ExpiredRecord]) -> Result<()> {
        let path = self.archive_path();
        let mut archive: Vec<ExpiredRecord> = read_json_opt(&path).await?.unwrap_or_default();
        archive.extend_from_slice(expired);
        write_json_atomic(&path, &archive)
            .await
            .with_context(|| format!("writing archive {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dre_core::{ProcedureBasic, ProcedureDetail};
    use tempfile::tempdir;

    fn record(number: &str, entity: &str, deadline: Option<&str>) -> ProcedureRecord {
        let basic = ProcedureBasic {
            procedure_number: number.to_string(),
            entity_name: entity.to_string(),
            link: format!("https://dre/{number}"),
        };
        match deadline {
            Some(deadline) => {
                let mut detail = ProcedureDetail::new(format!("Prazo: {deadline}"));
                detail.set(DetailField::ProposalDeadline, Some(deadline.to_string()));
                ProcedureRecord::with_detail(basic, detail)
            }
            None => ProcedureRecord::basic_only(basic),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).single().unwrap()
    }

    #[test]
    fn shared_identity_is_replaced_and_nothing_else_changes() {
        let registry = registry_from_records([
            record("1", "A", None),
            record("2", "B", Some("01-11-2026")),
        ]);
        let before_b = registry.values().nth(1).cloned().unwrap();

        let (merged, stats) = RegistryMerger::merge(registry, [record("1", "A", Some("30-10-2026 17:00"))]);

        assert_eq!(merged.len(), 2);
        assert_eq!(
            stats,
            MergeStats {
                inserted: 0,
                refreshed: 1,
                retained: 1
            }
        );
        let a = merged.values().next().unwrap();
        assert_eq!(a.detail_value(DetailField::ProposalDeadline), Some("30-10-2026 17:00"));
        assert_eq!(merged.values().nth(1), Some(&before_b));
    }

    #[test]
    fn disjoint_batch_grows_registry_by_batch_size() {
        let registry = registry_from_records([record("1", "A", None), record("2", "B", None)]);
        let batch = vec![record("3", "C", None), record("4", "D", None), record("N/A", "E", None)];
        let (merged, stats) = RegistryMerger::merge(registry, batch);
        assert_eq!(merged.len(), 5);
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.retained, 2);
    }

    #[test]
    fn duplicates_within_a_batch_collapse_to_the_last() {
        let (merged, stats) = RegistryMerger::merge(
            ActiveRegistry::new(),
            [record("1", "A", None), record("1", "A", Some("01-01-2027"))],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(stats.inserted, 1);
        assert!(merged.values().next().unwrap().has_detail());
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(StalenessPolicy::parse("retain").unwrap(), StalenessPolicy::Retain);
        assert_eq!(
            StalenessPolicy::parse("Deadline:7").unwrap(),
            StalenessPolicy::DeadlinePassed { grace_days: 7 }
        );
        assert_eq!(
            StalenessPolicy::parse("deadline").unwrap(),
            StalenessPolicy::DeadlinePassed { grace_days: 0 }
        );
        assert!(StalenessPolicy::parse("deadline:soon").is_err());
        assert!(StalenessPolicy::parse("forever").is_err());
    }

    #[test]
    fn deadline_formats() {
        let d = NaiveDate::from_ymd_opt(2026, 10, 30).unwrap();
        assert_eq!(parse_deadline("30-10-2026 17:00"), Some(d));
        assert_eq!(parse_deadline("30-10-2026"), Some(d));
        assert_eq!(parse_deadline(" 30/10/2026 (hora legal) "), Some(d));
        assert_eq!(parse_deadline("30 dias após publicação"), None);
    }

    #[test]
    fn retain_policy_never_removes() {
        let mut registry = registry_from_records([record("1", "A", Some("01-01-2000"))]);
        assert!(StalenessPolicy::Retain.prune(&mut registry, now()).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deadline_policy_respects_grace_and_unparsable_deadlines() {
        let mut registry = registry_from_records([
            record("1", "A", Some("10-10-2026 17:00")),
            record("2", "B", Some("14-10-2026")),
            record("3", "C", Some("a definir")),
            record("4", "D", None),
        ]);
        let expired = StalenessPolicy::DeadlinePassed { grace_days: 3 }.prune(&mut registry, now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].record.basic.procedure_number, "1");
        assert_eq!(expired[0].removed_at, now());
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn manager_round_trips_and_archives_before_removal() {
        let dir = tempdir().unwrap();
        let manager = RegistryManager::new(dir.path());
        assert!(manager.load().await.unwrap().is_empty());

        let (mut registry, stats) = manager
            .merge_with_existing(vec![record("1", "A", Some("01-01-2026")), record("2", "B", None)])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 2);

        let expired = manager
            .prune(&mut registry, StalenessPolicy::DeadlinePassed { grace_days: 0 }, now())
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        let path = manager.save(&registry).await.unwrap();
        assert_eq!(path, dir.path().join("data").join("ativos.json"));

        let reloaded = manager.load().await.unwrap();
        assert_eq!(reloaded, registry);

        let archive: Vec<ExpiredRecord> = read_json_opt(&manager.archive_path()).await.unwrap().unwrap();
        assert_eq!(archive, expired);

        let again = manager
            .prune(&mut registry, StalenessPolicy::DeadlinePassed { grace_days: 0 }, now())
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn date_file_must_exist() {
        let dir = tempdir().unwrap();
        let manager = RegistryManager::new(dir.path());
        assert!(manager
            .update_from_date_file(&dir.path().join("data/16-10-2026.json"))
            .await
            .is_err());
    }
}
