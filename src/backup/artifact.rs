// pgbackuptool/src/backup/artifact.rs
use chrono::NaiveDateTime;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::errors::{AppError, Result};

/// Object key prefix for artifacts in the remote tier.
pub const REMOTE_PREFIX: &str = "postgres_backups/";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

static ARTIFACT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^postgres_(.+)_backup_(\d{8}_\d{6})\.sql\.gz$").expect("artifact name pattern is valid")
});

/// One compressed full-cluster dump on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub database_version: String,
    pub created_at: NaiveDateTime,
    pub size_bytes: u64,
}

impl BackupArtifact {
    pub fn file_name(&self) -> String {
        artifact_file_name(&self.database_version, self.created_at)
    }

    pub fn remote_key(&self) -> String {
        remote_key(&self.file_name())
    }
}

/// Identity recovered from an artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub database_version: String,
    pub created_at: NaiveDateTime,
}

/// `postgres_<version>_backup_<YYYYMMDD>_<HHMMSS>.sql.gz`
pub fn artifact_file_name(database_version: &str, created_at: NaiveDateTime) -> String {
    format!(
        "postgres_{}_backup_{}.sql.gz",
        database_version,
        created_at.format(TIMESTAMP_FORMAT)
    )
}

pub fn remote_key(file_name: &str) -> String {
    format!("{}{}", REMOTE_PREFIX, file_name)
}

/// Cheap shape check equivalent to the `postgres_*_backup_*.sql.gz` glob.
pub fn looks_like_artifact(file_name: &str) -> bool {
    file_name.starts_with("postgres_")
        && file_name.contains("_backup_")
        && file_name.ends_with(".sql.gz")
}

pub fn parse_artifact_file_name(file_name: &str) -> Result<ArtifactName> {
    let captures = ARTIFACT_NAME
        .captures(file_name)
        .ok_or_else(|| AppError::InvalidInput(format!("not an artifact name: {}", file_name)))?;

    let created_at = NaiveDateTime::parse_from_str(&captures[2], TIMESTAMP_FORMAT).map_err(|e| {
        AppError::InvalidInput(format!("invalid timestamp in {}: {}", file_name, e))
    })?;

    Ok(ArtifactName {
        database_version: captures[1].to_string(),
        created_at,
    })
}
