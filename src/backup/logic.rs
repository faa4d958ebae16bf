// pgbackuptool/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info};

use super::artifact::BackupArtifact;
use super::db_dump::BackupProducer;
use super::s3_upload::replicate_artifact;
use crate::cleanup::{RetentionOutcome, perform_retention_sweeps};
use crate::config::AppConfig;
use crate::storage::ObjectStore;
use crate::utils::lock::BackupLock;
use crate::utils::retry::RetryPolicy;

#[derive(Debug)]
pub struct BackupRunSummary {
    pub artifact: BackupArtifact,
    pub remote_key: Option<String>,
    pub retention: RetentionOutcome,
}

/// One scheduled run: produce → replicate → sweep local → sweep remote.
///
/// Any step failing after its retries aborts the remaining steps.
pub async fn perform_backup_orchestration(
    app_config: &AppConfig,
    producer: &BackupProducer,
    store: Option<&dyn ObjectStore>,
    retry: &RetryPolicy,
) -> Result<BackupRunSummary> {
    info!("🚀 Starting database backup process");
    info!("🛠 Using backup directory: {}", app_config.local_backup_dir.display());

    let lock = BackupLock::acquire(&app_config.local_backup_dir)
        .context("Cannot start backup while another run is active")?;
    debug!("Holding run lock {}", lock.path().display());

    let artifact = producer
        .produce(retry)
        .await
        .context("Backup creation failed")?;

    let remote_key = replicate_artifact(store, &artifact, retry)
        .await
        .context("Uploading backup to remote storage failed")?;

    let retention = perform_retention_sweeps(app_config, store, retry, Local::now().naive_local())
        .await
        .context("Retention cleanup failed")?;

    drop(lock);
    Ok(BackupRunSummary {
        artifact,
        remote_key,
        retention,
    })
}
