mod logic;
pub(crate) mod artifact;
pub(crate) mod db_dump;
pub(crate) mod s3_upload;

use anyhow::Result;
use tracing::info;

use crate::config::AppConfig;
use crate::storage::{ObjectStore, S3ObjectStore};
use crate::utils::retry::RetryPolicy;
use db_dump::{BackupProducer, DumpPipeline};

/// Public entry point for the scheduled backup run.
/// Wires the real pg_dumpall/gzip pipeline and remote store into the orchestration.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<()> {
    let producer = BackupProducer::new(
        app_config.local_backup_dir.clone(),
        DumpPipeline::for_postgres(app_config),
    );
    let store = match &app_config.remote {
        Some(remote) => Some(S3ObjectStore::connect(remote).await),
        None => None,
    };
    let store_ref = store.as_ref().map(|s| s as &dyn ObjectStore);

    let summary =
        logic::perform_backup_orchestration(app_config, &producer, store_ref, &RetryPolicy::default()).await?;

    info!(
        artifact = %summary.artifact.path.display(),
        size_bytes = summary.artifact.size_bytes,
        remote_key = summary.remote_key.as_deref().unwrap_or("-"),
        "🎉 Backup completed: {} expired local and {} expired remote backups removed",
        summary.retention.local.deleted.len(),
        summary.retention.remote.as_ref().map_or(0, |r| r.deleted.len())
    );
    Ok(())
}
