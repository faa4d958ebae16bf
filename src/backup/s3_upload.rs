// pgbackuptool/src/backup/s3_upload.rs
use tracing::info;

use super::artifact::BackupArtifact;
use crate::errors::Result;
use crate::storage::ObjectStore;
use crate::utils::retry::RetryPolicy;

/// Pushes `artifact` to the remote tier under `postgres_backups/<file name>`.
///
/// `None` means replication is disabled and is a successful no-op. Each retry
/// re-checks the bucket and re-uploads the whole file. Returns the object key
/// when something was uploaded.
pub async fn replicate_artifact(
    store: Option<&dyn ObjectStore>,
    artifact: &BackupArtifact,
    retry: &RetryPolicy,
) -> Result<Option<String>> {
    let Some(store) = store else {
        info!("Remote backup disabled, skipping upload");
        return Ok(None);
    };

    let key = artifact.remote_key();
    info!("☁️ Uploading backup to remote storage as {}", key);

    let (path, object_key) = (artifact.path.as_path(), key.as_str());
    retry
        .execute("upload backup", |_| async move {
            store.ensure_bucket().await?;
            store.upload_file(path, object_key).await
        })
        .await?;

    info!("✅ Backup uploaded to remote storage: {}", key);
    Ok(Some(key))
}
