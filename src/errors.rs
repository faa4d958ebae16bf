use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Executable not found: {0}")]
    MissingExecutable(String),

    #[error("Command `{program}` failed ({status}): {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Backup pipeline failed: {0}")]
    Pipeline(String),

    #[error("PostgreSQL not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("Readiness probe failed on final attempt {attempt}: {reason}")]
    ProbeFailed { attempt: u32, reason: String },

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Another backup run holds the lock at {0}")]
    Locked(String),
}

impl AppError {
    /// Wraps any displayable S3 SDK error, keeping the full source chain in the message.
    pub fn storage<E: std::error::Error>(context: &str, err: E) -> Self {
        let mut message = format!("{}: {}", context, err);
        let mut source = err.source();
        while let Some(inner) = source {
            message.push_str(&format!(": {}", inner));
            source = inner.source();
        }
        AppError::Storage(message)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
