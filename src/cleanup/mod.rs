pub(crate) mod retention;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::config::AppConfig;
use crate::storage::{ObjectStore, S3ObjectStore};
use crate::utils::retry::RetryPolicy;
use retention::{SweepReport, SweepTally, retention_cutoff, sweep_local, sweep_remote};

/// Per-tier results of one retention pass.
#[derive(Debug, Default)]
pub struct RetentionOutcome {
    pub local: SweepReport,
    pub remote: Option<SweepReport>,
}

/// Public entry point for the cleanup process.
pub async fn run_cleanup_flow(app_config: &AppConfig) -> Result<()> {
    let store = match &app_config.remote {
        Some(remote) => Some(S3ObjectStore::connect(remote).await),
        None => None,
    };
    let store_ref = store.as_ref().map(|s| s as &dyn ObjectStore);

    let outcome = perform_retention_sweeps(
        app_config,
        store_ref,
        &RetryPolicy::default(),
        Local::now().naive_local(),
    )
    .await?;

    info!(
        "✅ Cleanup finished: {} local and {} remote backups deleted",
        outcome.local.deleted.len(),
        outcome.remote.as_ref().map_or(0, |r| r.deleted.len())
    );
    Ok(())
}

/// Local sweep, then remote sweep when a store is given. Each sweep is retried independently;
/// a local failure stops before the remote tier.
pub async fn perform_retention_sweeps(
    app_config: &AppConfig,
    store: Option<&dyn ObjectStore>,
    retry: &RetryPolicy,
    now: NaiveDateTime,
) -> Result<RetentionOutcome> {
    let cutoff = retention_cutoff(now, app_config.retention_days);
    info!(
        "Retention: {} days (deleting backups created before {})",
        app_config.retention_days, cutoff
    );

    let backup_dir = app_config.local_backup_dir.as_path();
    let local_tally = SweepTally::default();
    retry
        .execute("clean local backups", |_| sweep_local(backup_dir, cutoff, &local_tally))
        .await
        .context("Local backup cleanup failed")?;
    let local = local_tally.into_report();

    let remote = match store {
        Some(store) => {
            let remote_tally = SweepTally::default();
            retry
                .execute("clean remote backups", |_| sweep_remote(store, cutoff, &remote_tally))
                .await
                .context("Remote backup cleanup failed")?;
            Some(remote_tally.into_report())
        }
        None => None,
    };

    Ok(RetentionOutcome { local, remote })
}
