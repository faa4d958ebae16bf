pub mod lock;
pub mod retry;

use std::path::PathBuf;
use which::which;

use crate::errors::{AppError, Result};

/// Finds an executable in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).map_err(|_| {
        AppError::MissingExecutable(format!(
            "{} not found in PATH. Please ensure it is installed and in your PATH.",
            name
        ))
    })
}
