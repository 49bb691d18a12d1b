//! Error types for the bot harness.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code reported for every harness-level failure.
pub const HARNESS_FAILURE_EXIT_CODE: i32 = 1;

/// Top-level error type for harness operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required directory or file is missing.
    #[error("{what} not found: {path}")]
    MissingPath { what: &'static str, path: PathBuf },

    /// An invocation precondition does not hold.
    #[error("{0}")]
    Precondition(String),

    /// The test descriptor could not be read or is invalid.
    #[error("invalid test parameters in {path}: {reason}")]
    Params { path: PathBuf, reason: String },

    /// Harness configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The device-control tool reported a failure.
    #[error("device command `{command}` failed: {reason}")]
    Device { command: String, reason: String },

    /// The device-control tool did not answer in time.
    #[error("device command `{command}` timed out after {timeout:?}")]
    DeviceTimeout { command: String, timeout: Duration },

    /// The test script could not be started.
    #[error("failed to launch test script {script}: {reason}")]
    Launch { script: PathBuf, reason: String },

    /// The harness received a termination signal.
    #[error("interrupted by {0}")]
    Interrupted(&'static str),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        HARNESS_FAILURE_EXIT_CODE
    }

    /// Returns true if the error comes from the device-control tool.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Error::Device { .. } | Error::DeviceTimeout { .. })
    }
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;
