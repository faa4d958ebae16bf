// pgbackuptool/src/cleanup/retention.rs
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::backup::artifact::{REMOTE_PREFIX, looks_like_artifact, parse_artifact_file_name};
use crate::errors::Result;
use crate::storage::ObjectStore;

/// Outcome of one sweep over one storage tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub kept: usize,
    /// Names that looked like artifacts but carried no parseable timestamp, plus nested remote keys.
    pub skipped: Vec<String>,
}

/// Sweep results shared by every retried attempt of one sweep.
///
/// Deletions survive a failed attempt; `kept` and `skipped` describe the latest attempt only.
#[derive(Debug, Default)]
pub struct SweepTally {
    report: Mutex<SweepReport>,
}

impl SweepTally {
    fn update(&self, apply: impl FnOnce(&mut SweepReport)) {
        match self.report.lock() {
            Ok(mut report) => apply(&mut report),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }

    fn begin_attempt(&self) {
        self.update(|r| {
            r.kept = 0;
            r.skipped.clear();
        });
    }

    fn record_deleted(&self, name: String) {
        self.update(|r| {
            if !r.deleted.contains(&name) {
                r.deleted.push(name);
            }
        });
    }

    fn record(&self, verdict: Verdict, name: String) {
        match verdict {
            Verdict::Expired => self.record_deleted(name),
            Verdict::Retained => self.update(|r| r.kept += 1),
            Verdict::Unparseable => self.update(|r| r.skipped.push(name)),
        }
    }

    pub fn into_report(self) -> SweepReport {
        self.report
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Oldest timestamp still retained: artifacts strictly older than this are expired.
pub fn retention_cutoff(now: NaiveDateTime, retention_days: u32) -> NaiveDateTime {
    now.checked_sub_signed(Duration::days(i64::from(retention_days)))
        .unwrap_or(NaiveDateTime::MIN)
}

pub fn is_expired(created_at: NaiveDateTime, cutoff: NaiveDateTime) -> bool {
    created_at < cutoff
}

enum Verdict {
    Expired,
    Retained,
    Unparseable,
}

fn judge(file_name: &str, cutoff: NaiveDateTime) -> Verdict {
    match parse_artifact_file_name(file_name) {
        Ok(name) if is_expired(name.created_at, cutoff) => Verdict::Expired,
        Ok(_) => Verdict::Retained,
        Err(e) => {
            warn!("⚠️ Could not parse backup date from {}: {}", file_name, e);
            Verdict::Unparseable
        }
    }
}

/// Deletes expired artifacts directly inside `backup_dir`. A missing directory is an empty sweep.
pub async fn sweep_local(backup_dir: &Path, cutoff: NaiveDateTime, tally: &SweepTally) -> Result<()> {
    info!("🧹 Cleaning local backups older than {} in {}", cutoff, backup_dir.display());
    tally.begin_attempt();

    if !backup_dir.exists() {
        info!("Local backup directory {} does not exist, nothing to clean", backup_dir.display());
        return Ok(());
    }

    for entry in WalkDir::new(backup_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !looks_like_artifact(&file_name) {
            continue;
        }

        let verdict = judge(&file_name, cutoff);
        if let Verdict::Expired = verdict {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            info!("🗑 Deleted expired backup: {}", entry.path().display());
        }
        tally.record(verdict, file_name);
    }

    Ok(())
}

/// Deletes expired artifacts under `postgres_backups/` in the remote bucket.
pub async fn sweep_remote(store: &dyn ObjectStore, cutoff: NaiveDateTime, tally: &SweepTally) -> Result<()> {
    info!("🧹 Cleaning remote backups older than {}", cutoff);
    tally.begin_attempt();

    for key in store.list_keys(REMOTE_PREFIX).await? {
        let file_name = key.strip_prefix(REMOTE_PREFIX).unwrap_or(&key);
        if file_name.contains('/') {
            tally.record(Verdict::Unparseable, key.clone());
            continue;
        }
        if !looks_like_artifact(file_name) {
            continue;
        }

        let verdict = judge(file_name, cutoff);
        if let Verdict::Expired = verdict {
            store.delete_object(&key).await?;
            info!("🗑 Deleted expired remote backup: {}", key);
        }
        tally.record(verdict, key);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::artifact::{artifact_file_name, remote_key};
    use crate::storage::memory::MemoryObjectStore;
    use chrono::NaiveDate;
    use std::sync::atomic::Ordering;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .and_then(|d| d.and_hms_opt(3, 30, 0))
            .expect("valid date")
    }

    fn days_ago(days: i64) -> NaiveDateTime {
        now() - Duration::days(days)
    }

    fn touch(dir: &Path, name: &str) -> std::io::Result<()> {
        std::fs::write(dir.join(name), b"backup")
    }

    async fn local_report(dir: &Path, cutoff: NaiveDateTime) -> Result<SweepReport> {
        let tally = SweepTally::default();
        sweep_local(dir, cutoff, &tally).await?;
        Ok(tally.into_report())
    }

    async fn remote_report(store: &dyn ObjectStore, cutoff: NaiveDateTime) -> Result<SweepReport> {
        let tally = SweepTally::default();
        sweep_remote(store, cutoff, &tally).await?;
        Ok(tally.into_report())
    }

    fn remaining(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[test]
    fn cutoff_boundary_is_strict() {
        let cutoff = retention_cutoff(now(), 7);
        assert_eq!(cutoff, days_ago(7));
        assert!(!is_expired(days_ago(7), cutoff));
        assert!(is_expired(days_ago(7) - Duration::seconds(1), cutoff));
    }

    #[test]
    fn zero_retention_keeps_only_the_present() {
        let cutoff = retention_cutoff(now(), 0);
        assert!(!is_expired(now(), cutoff));
        assert!(is_expired(now() - Duration::seconds(1), cutoff));
    }

    #[tokio::test]
    async fn local_sweep_removes_only_expired_artifacts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let names: Vec<String> = [10, 8, 6, 1]
            .iter()
            .map(|d| artifact_file_name("16.4", days_ago(*d)))
            .collect();
        for name in &names {
            touch(dir.path(), name)?;
        }

        let report = local_report(dir.path(), retention_cutoff(now(), 7)).await?;

        let mut expected_deleted = vec![names[0].clone(), names[1].clone()];
        expected_deleted.sort();
        let mut deleted = report.deleted.clone();
        deleted.sort();
        assert_eq!(deleted, expected_deleted);
        assert_eq!(report.kept, 2);

        let mut expected_left = vec![names[2].clone(), names[3].clone()];
        expected_left.sort();
        assert_eq!(remaining(dir.path()), expected_left);
        Ok(())
    }

    #[tokio::test]
    async fn local_sweep_boundary_second() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let on_cutoff = artifact_file_name("16.4", days_ago(7));
        let just_past = artifact_file_name("16.4", days_ago(7) - Duration::seconds(1));
        touch(dir.path(), &on_cutoff)?;
        touch(dir.path(), &just_past)?;

        let report = local_report(dir.path(), retention_cutoff(now(), 7)).await?;

        assert_eq!(report.deleted, vec![just_past]);
        assert_eq!(remaining(dir.path()), vec![on_cutoff]);
        Ok(())
    }

    #[tokio::test]
    async fn local_sweep_skips_malformed_and_unrelated_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        touch(dir.path(), "postgres_16.4_backup_latest.sql.gz")?;
        touch(dir.path(), "notes.txt")?;
        touch(dir.path(), ".pgbackuptool.lock")?;
        std::fs::create_dir(dir.path().join(artifact_file_name("16.4", days_ago(30))))?;

        let report = local_report(dir.path(), retention_cutoff(now(), 7)).await?;

        assert!(report.deleted.is_empty());
        assert_eq!(report.skipped, vec!["postgres_16.4_backup_latest.sql.gz".to_string()]);
        assert_eq!(remaining(dir.path()).len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn local_sweep_of_missing_directory_is_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let report = local_report(&dir.path().join("absent"), retention_cutoff(now(), 7)).await?;
        assert_eq!(report, SweepReport::default());
        Ok(())
    }

    #[tokio::test]
    async fn remote_sweep_applies_same_cutoff() -> anyhow::Result<()> {
        let old = remote_key(&artifact_file_name("16.4", days_ago(10)));
        let older = remote_key(&artifact_file_name("16.4", days_ago(8)));
        let recent = remote_key(&artifact_file_name("16.4", days_ago(6)));
        let fresh = remote_key(&artifact_file_name("16.4", days_ago(1)));
        let garbage = "postgres_backups/postgres_x_backup_bad.sql.gz".to_string();
        let elsewhere = artifact_file_name("16.4", days_ago(30));
        let store = MemoryObjectStore::with_keys(
            [&old, &older, &recent, &fresh, &garbage, &elsewhere].map(String::as_str),
        );

        let report = remote_report(&store, retention_cutoff(now(), 7)).await?;

        let mut deleted = report.deleted.clone();
        deleted.sort();
        let mut expected = vec![old, older];
        expected.sort();
        assert_eq!(deleted, expected);
        assert_eq!(report.kept, 2);
        assert_eq!(report.skipped, vec![garbage.clone()]);

        let mut left = vec![recent, fresh, garbage, elsewhere];
        left.sort();
        assert_eq!(store.keys(), left);
        Ok(())
    }

    #[tokio::test]
    async fn remote_sweep_rerun_after_failure_is_idempotent() -> anyhow::Result<()> {
        let a = remote_key(&artifact_file_name("16.4", days_ago(20)));
        let b = remote_key(&artifact_file_name("16.4", days_ago(19)));
        let store = MemoryObjectStore::with_keys([a.as_str(), b.as_str()]);
        store.failing_deletes.store(1, Ordering::SeqCst);
        let cutoff = retention_cutoff(now(), 7);

        let tally = SweepTally::default();
        assert!(sweep_remote(&store, cutoff, &tally).await.is_err());
        sweep_remote(&store, cutoff, &tally).await?;

        assert_eq!(tally.into_report().deleted, vec![a, b]);
        assert!(store.keys().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn deletions_from_a_failed_attempt_stay_in_the_report() -> anyhow::Result<()> {
        let keys: Vec<String> = [30, 20, 10]
            .iter()
            .map(|d| remote_key(&artifact_file_name("16.4", days_ago(*d))))
            .collect();
        let store = MemoryObjectStore::with_keys(keys.iter().map(String::as_str));
        store.failing_delete_call.store(2, Ordering::SeqCst);
        let cutoff = retention_cutoff(now(), 7);

        let tally = SweepTally::default();
        assert!(sweep_remote(&store, cutoff, &tally).await.is_err());
        assert_eq!(store.keys().len(), 2);
        sweep_remote(&store, cutoff, &tally).await?;

        let mut deleted = tally.into_report().deleted;
        deleted.sort();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(store.keys().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn retried_attempt_recounts_kept_and_skipped() -> anyhow::Result<()> {
        let expired = remote_key(&artifact_file_name("16.4", days_ago(20)));
        let fresh = remote_key(&artifact_file_name("16.4", days_ago(1)));
        let garbage = "postgres_backups/postgres_x_backup_bad.sql.gz".to_string();
        let store = MemoryObjectStore::with_keys([&expired, &fresh, &garbage].map(String::as_str));
        store.failing_deletes.store(1, Ordering::SeqCst);
        let cutoff = retention_cutoff(now(), 7);

        let tally = SweepTally::default();
        assert!(sweep_remote(&store, cutoff, &tally).await.is_err());
        sweep_remote(&store, cutoff, &tally).await?;

        let report = tally.into_report();
        assert_eq!(report.deleted, vec![expired]);
        assert_eq!(report.kept, 1);
        assert_eq!(report.skipped, vec![garbage]);
        Ok(())
    }

    #[tokio::test]
    async fn nested_remote_keys_are_skipped_not_deleted() -> anyhow::Result<()> {
        let nested = format!(
            "{}archive/{}",
            REMOTE_PREFIX,
            artifact_file_name("16.4", days_ago(30))
        );
        let store = MemoryObjectStore::with_keys([nested.as_str()]);

        let report = remote_report(&store, retention_cutoff(now(), 7)).await?;

        assert!(report.deleted.is_empty());
        assert_eq!(report.skipped, vec![nested.clone()]);
        assert_eq!(store.keys(), vec![nested]);
        Ok(())
    }
}
