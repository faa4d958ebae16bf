// pgbackuptool/src/backup/db_dump.rs
use chrono::{Local, NaiveDateTime, SubsecRound};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use super::artifact::{BackupArtifact, artifact_file_name};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::utils::find_executable;
use crate::utils::retry::RetryPolicy;

/// An external program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn resolve(&self) -> Result<PathBuf> {
        find_executable(&self.program)
    }
}

/// The three external commands a backup needs: version report, cluster dump, compressor.
#[derive(Debug, Clone)]
pub struct DumpPipeline {
    pub version: CommandSpec,
    pub dump: CommandSpec,
    pub compress: CommandSpec,
    /// Fail when the dump exits non-zero even though the compressor succeeded.
    pub strict_dump_status: bool,
}

impl DumpPipeline {
    pub fn for_postgres(config: &AppConfig) -> Self {
        Self {
            version: CommandSpec::new("postgres", ["--version"]),
            dump: CommandSpec::new("pg_dumpall", ["-U", config.postgres.user.as_str()]),
            compress: CommandSpec::new("gzip", Vec::<String>::new()),
            strict_dump_status: config.strict_dump_status,
        }
    }
}

/// Reads the server version from `postgres --version` style output
/// (`postgres (PostgreSQL) 16.4` → `16.4`).
pub async fn query_database_version(spec: &CommandSpec) -> Result<String> {
    let program = spec.resolve()?;
    let output = Command::new(&program)
        .args(&spec.args)
        .output()
        .await?;

    if !output.status.success() {
        return Err(AppError::Command {
            program: spec.program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version_report(&stdout)
}

fn parse_version_report(report: &str) -> Result<String> {
    let version = report.split_whitespace().nth(2).ok_or_else(|| {
        AppError::Pipeline(format!("unexpected version report: '{}'", report.trim()))
    })?;
    if version.contains(['/', '\\']) {
        return Err(AppError::Pipeline(format!(
            "version '{}' cannot be used in a file name",
            version
        )));
    }
    Ok(version.to_string())
}

/// Streams `dump` stdout into `compress` stdin and the compressor's stdout into `destination`.
///
/// Success is decided by the compressor's exit status. A failing dump is an
/// error only in strict mode; otherwise it is logged as a warning. Returns the
/// size of the written file.
pub async fn run_dump_pipeline(pipeline: &DumpPipeline, destination: &Path) -> Result<u64> {
    let dump_program = pipeline.dump.resolve()?;
    let compress_program = pipeline.compress.resolve()?;

    let output_file = tokio::fs::File::create(destination).await?.into_std().await;

    let mut dump_child = Command::new(&dump_program)
        .args(&pipeline.dump.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let dump_stdout = dump_child
        .stdout
        .take()
        .ok_or_else(|| AppError::Pipeline("dump stdout was not captured".to_string()))?;
    let compress_stdin: Stdio = dump_stdout.try_into()?;

    let compress_child = {
        let mut command = Command::new(&compress_program);
        command
            .args(&pipeline.compress.args)
            .stdin(compress_stdin)
            .stdout(Stdio::from(output_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command.spawn()?
        // `command` drops here, releasing this process's copy of the pipe.
    };

    let (dump_result, compress_result) =
        tokio::join!(dump_child.wait_with_output(), compress_child.wait_with_output());
    let dump_output = dump_result?;
    let compress_output = compress_result?;

    if !compress_output.status.success() {
        return Err(AppError::Command {
            program: pipeline.compress.program.clone(),
            status: compress_output.status.to_string(),
            stderr: String::from_utf8_lossy(&compress_output.stderr).trim().to_string(),
        });
    }

    if !dump_output.status.success() {
        let stderr = String::from_utf8_lossy(&dump_output.stderr).trim().to_string();
        if pipeline.strict_dump_status {
            return Err(AppError::Command {
                program: pipeline.dump.program.clone(),
                status: dump_output.status.to_string(),
                stderr,
            });
        }
        warn!(
            status = %dump_output.status,
            "⚠️ {} exited unsuccessfully but {} succeeded; artifact may be incomplete: {}",
            pipeline.dump.program,
            pipeline.compress.program,
            stderr
        );
    }

    Ok(tokio::fs::metadata(destination).await?.len())
}

/// Creates one compressed full-cluster artifact per call.
#[derive(Debug, Clone)]
pub struct BackupProducer {
    backup_dir: PathBuf,
    pipeline: DumpPipeline,
}

impl BackupProducer {
    pub fn new(backup_dir: PathBuf, pipeline: DumpPipeline) -> Self {
        Self { backup_dir, pipeline }
    }

    /// Runs [`Self::produce_once`] under the retry policy. Every attempt starts over
    /// with a fresh timestamp.
    pub async fn produce(&self, retry: &RetryPolicy) -> Result<BackupArtifact> {
        retry.execute("create backup", |_| self.produce_once()).await
    }

    pub async fn produce_once(&self) -> Result<BackupArtifact> {
        let database_version = query_database_version(&self.pipeline.version).await?;
        let created_at: NaiveDateTime = Local::now().naive_local().trunc_subsecs(0);

        tokio::fs::create_dir_all(&self.backup_dir).await?;
        let path = self
            .backup_dir
            .join(artifact_file_name(&database_version, created_at));

        info!("🗜 Starting database backup to {}", path.display());

        match run_dump_pipeline(&self.pipeline, &path).await {
            Ok(size_bytes) => {
                info!(size_bytes, "✅ Local backup completed: {}", path.display());
                Ok(BackupArtifact {
                    path,
                    database_version,
                    created_at,
                    size_bytes,
                })
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!("⚠️ Failed to remove partial backup {}: {}", path.display(), remove_err);
                    }
                }
                Err(e)
            }
        }
    }
}
