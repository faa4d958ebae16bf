// pgbackuptool/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use s3::types::{CompletedMultipartUpload, CompletedPart};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::ObjectStore;
use crate::config::RemoteConfig;
use crate::errors::{AppError, Result};

/// Files above this size are uploaded in parts of this size (S3 minimum is 5 MiB).
const PART_SIZE: usize = 8 * 1024 * 1024;

/// MinIO / S3-compatible bucket accessed through the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn connect(remote: &RemoteConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&remote.endpoint_url)
            .region(Region::new(remote.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &remote.access_key_id,
                &remote.secret_access_key,
                None, // session_token
                None, // expiry
                "Static",
            ))
            .load()
            .await;

        // MinIO serves buckets by path, not by virtual host.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        debug!("Configured S3 client for endpoint {}", remote.endpoint_url);
        Self {
            client: s3::Client::from_conf(s3_config),
            bucket: remote.bucket_name.clone(),
        }
    }

    async fn put_single(&self, path: &Path, key: &str, total: u64) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| AppError::storage(&format!("Failed to read {}", path.display()), e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::storage(&format!("Failed to upload {}", key), e))?;

        info!("📤 Uploaded {} / {} bytes", total, total);
        Ok(())
    }

    async fn put_multipart(&self, path: &Path, key: &str, total: u64) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::storage(&format!("Failed to start multipart upload for {}", key), e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| AppError::Storage(format!("No upload id returned for {}", key)))?
            .to_string();

        match self.upload_parts(path, key, &upload_id, total).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| AppError::storage(&format!("Failed to complete upload of {}", key), e))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("⚠️ Failed to abort multipart upload {}: {}", upload_id, abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        total: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut parts = Vec::new();
        let mut sent: u64 = 0;
        let mut part_number: i32 = 1;

        loop {
            let chunk = read_chunk(&mut file, PART_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            let chunk_len = chunk.len() as u64;

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| AppError::storage(&format!("Failed to upload part {} of {}", part_number, key), e))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );

            sent += chunk_len;
            info!("📤 Uploaded {} / {} bytes", sent, total);
            part_number += 1;
        }

        Ok(parts)
    }
}

/// Reads up to `size` bytes, returning fewer only at end of file.
async fn read_chunk(file: &mut tokio::fs::File, size: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = file.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buffer.truncate(filled);
    Ok(buffer)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self) -> Result<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        info!("🪣 Bucket {} not found, creating it", self.bucket);
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let already_there = e.as_service_error().is_some_and(|service| {
                    service.is_bucket_already_owned_by_you() || service.is_bucket_already_exists()
                });
                if already_there {
                    Ok(())
                } else {
                    Err(AppError::storage(&format!("Failed to create bucket {}", self.bucket), e))
                }
            }
        }
    }

    async fn upload_file(&self, path: &Path, key: &str) -> Result<u64> {
        let total = tokio::fs::metadata(path).await?.len();
        info!(
            "Uploading {} to bucket {} with key {} ({} bytes)",
            path.display(),
            self.bucket,
            key,
            total
        );

        if total as usize <= PART_SIZE {
            self.put_single(path, key, total).await?;
        } else {
            self.put_multipart(path, key, total).await?;
        }
        Ok(total)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| AppError::storage(&format!("Failed to list objects under {}", prefix), e))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match (page.is_truncated(), page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::storage(&format!("Failed to delete {}", key), e))?;
        Ok(())
    }
}
