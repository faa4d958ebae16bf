//! Remote object storage used by the replicator and the retention sweeper.

mod s3;

use async_trait::async_trait;
use std::path::Path;

use crate::errors::Result;

pub use s3::S3ObjectStore;

/// Operations the backup pipeline needs from an S3-compatible bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the bucket when it does not exist yet. Existing buckets are not an error.
    async fn ensure_bucket(&self) -> Result<()>;

    /// Uploads a local file under `key`, returning the number of bytes sent.
    async fn upload_file(&self, path: &Path, key: &str) -> Result<u64>;

    /// Every key starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes `key`. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use crate::errors::AppError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory bucket with injectable failures.
    #[derive(Default)]
    pub struct MemoryObjectStore {
        pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
        pub bucket_created: Mutex<bool>,
        pub failing_uploads: AtomicU32,
        pub failing_deletes: AtomicU32,
        /// 1-based `delete_object` call that fails once; 0 disables it.
        pub failing_delete_call: AtomicU32,
        pub delete_calls: AtomicU32,
        pub upload_calls: AtomicU32,
    }

    impl MemoryObjectStore {
        pub fn with_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
            let store = Self::default();
            if let Ok(mut objects) = store.objects.lock() {
                for key in keys {
                    objects.insert(key.to_string(), Vec::new());
                }
            }
            store
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects
                .lock()
                .map(|objects| objects.keys().cloned().collect())
                .unwrap_or_default()
        }

        fn take_failure(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn ensure_bucket(&self) -> Result<()> {
            *self.bucket_created.lock().map_err(|e| AppError::Storage(e.to_string()))? = true;
            Ok(())
        }

        async fn upload_file(&self, path: &Path, key: &str) -> Result<u64> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.failing_uploads) {
                return Err(AppError::Storage("injected upload failure".to_string()));
            }
            let body = std::fs::read(path)?;
            let len = body.len() as u64;
            self.objects
                .lock()
                .map_err(|e| AppError::Storage(e.to_string()))?
                .insert(key.to_string(), body);
            Ok(len)
        }

        async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .keys()
                .into_iter()
                .filter(|k| k.starts_with(prefix))
                .collect())
        }

        async fn delete_object(&self, key: &str) -> Result<()> {
            let call = self.delete_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let fails_this_call = self
                .failing_delete_call
                .compare_exchange(call, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if fails_this_call || Self::take_failure(&self.failing_deletes) {
                return Err(AppError::Storage("injected delete failure".to_string()));
            }
            self.objects
                .lock()
                .map_err(|e| AppError::Storage(e.to_string()))?
                .remove(key);
            Ok(())
        }
    }
}
