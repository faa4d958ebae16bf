// pgbackuptool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_BACKUP_DIR: &str = "/backups";
pub const DEFAULT_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_EXTENSIONS: &str = "postgis,postgis_topology,postgis_raster,pgrouting,hstore";
pub const DEFAULT_PG_LOG_FILE: &str = "/var/lib/postgresql/data/pg_log/postgresql.log";
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for the MinIO / S3-compatible remote tier.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub log_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// `None` when POSTGRES_MULTIPLE_DATABASES is unset: provisioning is skipped.
    pub databases: Option<Vec<String>>,
    pub extensions: Vec<String>,
}

/// Process-wide configuration, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub local_backup_dir: PathBuf,
    pub retention_days: u32,
    /// `Some` exactly when REMOTE_BACKUP_ENABLED is true.
    pub remote: Option<RemoteConfig>,
    pub postgres: PostgresConfig,
    pub bootstrap: BootstrapConfig,
    pub strict_dump_status: bool,
}

/// Redacted view printed by the `config` command.
#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub local_backup_dir: String,
    pub retention_days: u32,
    pub remote_backup_enabled: bool,
    pub remote_endpoint: Option<String>,
    pub remote_bucket: Option<String>,
    pub remote_access_key: Option<String>,
    pub postgres_user: String,
    pub postgres_host: String,
    pub postgres_port: u16,
    pub databases: Option<Vec<String>>,
    pub extensions: Vec<String>,
    pub strict_dump_status: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let local_backup_dir = PathBuf::from(
            get("LOCAL_BACKUP_DIR").unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_string()),
        );

        let retention_days = match get("BACKUP_RETENTION_DAYS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("BACKUP_RETENTION_DAYS must be a non-negative integer, got '{}'", raw))?,
            None => DEFAULT_RETENTION_DAYS,
        };

        let remote_enabled = parse_bool("REMOTE_BACKUP_ENABLED", get("REMOTE_BACKUP_ENABLED"), false)?;
        let remote = if remote_enabled {
            Some(load_remote_config(&get)?)
        } else {
            None
        };

        let port = match get("PGPORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PGPORT must be a valid port number, got '{}'", raw))?,
            None => 5432,
        };

        let postgres = PostgresConfig {
            user: get("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
            host: get("PGHOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            password: get("POSTGRES_PASSWORD"),
            log_file: PathBuf::from(get("PG_LOG_FILE").unwrap_or_else(|| DEFAULT_PG_LOG_FILE.to_string())),
        };

        let bootstrap = BootstrapConfig {
            databases: get("POSTGRES_MULTIPLE_DATABASES").map(|raw| parse_name_list(&raw)),
            extensions: parse_name_list(
                &get("POSTGRES_MULTIPLE_EXTENSIONS").unwrap_or_else(|| DEFAULT_EXTENSIONS.to_string()),
            ),
        };

        Ok(AppConfig {
            local_backup_dir,
            retention_days,
            remote,
            postgres,
            bootstrap,
            strict_dump_status: parse_bool(
                "BACKUP_STRICT_DUMP_STATUS",
                get("BACKUP_STRICT_DUMP_STATUS"),
                false,
            )?,
        })
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            local_backup_dir: self.local_backup_dir.display().to_string(),
            retention_days: self.retention_days,
            remote_backup_enabled: self.remote_enabled(),
            remote_endpoint: self.remote.as_ref().map(|r| r.endpoint_url.clone()),
            remote_bucket: self.remote.as_ref().map(|r| r.bucket_name.clone()),
            remote_access_key: self.remote.as_ref().map(|r| redact(&r.access_key_id)),
            postgres_user: self.postgres.user.clone(),
            postgres_host: self.postgres.host.clone(),
            postgres_port: self.postgres.port,
            databases: self.bootstrap.databases.clone(),
            extensions: self.bootstrap.extensions.clone(),
            strict_dump_status: self.strict_dump_status,
        }
    }
}

fn load_remote_config<G>(get: &G) -> Result<RemoteConfig>
where
    G: Fn(&str) -> Option<String>,
{
    let required = |key: &str| {
        get(key).with_context(|| format!("{} must be set when REMOTE_BACKUP_ENABLED is true", key))
    };

    let endpoint = required("MINIO_ENDPOINT")?;
    let access_key_id = required("MINIO_ACCESS_KEY")?;
    let secret_access_key = required("MINIO_SECRET_KEY")?;
    let bucket_name = required("MINIO_BUCKET")?;
    let secure = parse_bool("MINIO_SECURE", get("MINIO_SECURE"), true)?;

    Ok(RemoteConfig {
        endpoint_url: normalize_endpoint(&endpoint, secure),
        region: get("MINIO_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        access_key_id,
        secret_access_key,
        bucket_name,
    })
}

/// MinIO endpoints are usually given as `host:port`; add the scheme the SDK needs.
fn normalize_endpoint(endpoint: &str, secure: bool) -> String {
    if endpoint.contains("://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        let scheme = if secure { "https" } else { "http" };
        format!("{}://{}", scheme, endpoint.trim_end_matches('/'))
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(other) => Err(anyhow::anyhow!(
            "{} must be a boolean (true/false), got '{}'",
            key,
            other
        )),
    }
}

/// Splits a comma and/or whitespace separated list, dropping empty entries.
pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}
