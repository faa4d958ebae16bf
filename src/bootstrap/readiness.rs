// pgbackuptool/src/bootstrap/readiness.rs
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::PostgresConfig;
use crate::errors::{AppError, Result};
use crate::utils::find_executable;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Ready,
    NotReady(String),
}

/// Point-in-time check of whether the server accepts connections.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// `Err` means the check itself could not run, as opposed to "not ready yet".
    async fn check(&self) -> Result<ProbeStatus>;

    /// Operator-facing context gathered after a failed check.
    async fn diagnostics(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Polls `probe` until it reports ready, returning the number of probes used.
///
/// There is no sleep after the final probe. A probe error on the last attempt
/// becomes [`AppError::ProbeFailed`]; exhausting attempts otherwise yields
/// [`AppError::NotReady`].
pub async fn wait_for_ready<P>(probe: &P, settings: ReadinessSettings) -> Result<u32>
where
    P: LivenessProbe + ?Sized,
{
    let max_attempts = settings.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match probe.check().await {
            Ok(ProbeStatus::Ready) => {
                info!(attempt, "✅ PostgreSQL is ready");
                return Ok(attempt);
            }
            Ok(ProbeStatus::NotReady(reason)) => {
                let diagnostics = probe.diagnostics().await;
                warn!(
                    attempt,
                    max_attempts,
                    "⏳ PostgreSQL not ready: {}{}",
                    reason,
                    format_diagnostics(&diagnostics)
                );
            }
            Err(e) if attempt == max_attempts => {
                return Err(AppError::ProbeFailed {
                    attempt,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                warn!(attempt, max_attempts, "⚠️ Readiness probe error: {}", e);
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(settings.retry_delay).await;
        }
    }

    Err(AppError::NotReady {
        attempts: max_attempts,
    })
}

fn format_diagnostics(lines: &[String]) -> String {
    lines.iter().map(|line| format!("\n  {}", line)).collect()
}

/// `pg_isready` against the configured host, with process and log diagnostics.
#[derive(Debug, Clone)]
pub struct PgIsReadyProbe {
    user: String,
    host: String,
    port: u16,
    log_file: PathBuf,
}

impl PgIsReadyProbe {
    pub fn new(config: &PostgresConfig) -> Self {
        Self {
            user: config.user.clone(),
            host: config.host.clone(),
            port: config.port,
            log_file: config.log_file.clone(),
        }
    }

    async fn process_status(&self) -> String {
        let output = match Command::new("ps").arg("-ef").output().await {
            Ok(output) => output,
            Err(e) => return format!("[process] unable to list processes: {}", e),
        };
        let listing = String::from_utf8_lossy(&output.stdout);
        let postgres_lines: Vec<&str> = listing
            .lines()
            .filter(|line| line.contains("postgres"))
            .collect();
        if postgres_lines.is_empty() {
            "[process] PostgreSQL process is not running".to_string()
        } else {
            format!("[process] PostgreSQL running: {}", postgres_lines.join(" | "))
        }
    }

    async fn log_tail(&self) -> String {
        match tokio::fs::read_to_string(&self.log_file).await {
            Ok(contents) => {
                let lines: Vec<&str> = contents.lines().collect();
                let start = lines.len().saturating_sub(LOG_TAIL_LINES);
                format!("[server log] {}", lines[start..].join("\n"))
            }
            Err(_) => format!("[server log] {} not found", self.log_file.display()),
        }
    }
}

#[async_trait]
impl LivenessProbe for PgIsReadyProbe {
    async fn check(&self) -> Result<ProbeStatus> {
        let pg_isready = find_executable("pg_isready")?;
        let port = self.port.to_string();
        let output = Command::new(pg_isready)
            .args(["-U", self.user.as_str(), "-h", self.host.as_str(), "-p", port.as_str()])
            .output()
            .await?;

        if output.status.success() {
            return Ok(ProbeStatus::Ready);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let detail = if stderr.is_empty() { stdout } else { stderr };
        Ok(ProbeStatus::NotReady(format!("pg_isready {}: {}", output.status, detail)))
    }

    async fn diagnostics(&self) -> Vec<String> {
        vec![self.process_status().await, self.log_tail().await]
    }
}
