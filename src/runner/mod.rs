//! Test script runners.
//!
//! A runner launches the test script with its streams redirected to files
//! and enforces the deadline.

mod process;

pub use process::ProcessRunner;

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Everything needed to launch one test script.
#[derive(Debug, Clone)]
pub struct ScriptLaunch {
    /// Absolute path of the executable.
    pub script: PathBuf,
    /// Positional arguments.
    pub args: Vec<OsString>,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// File receiving the child's standard output.
    pub stdout_path: PathBuf,
    /// File receiving the child's standard error.
    pub stderr_path: PathBuf,
    /// Time the child may run before it is killed.
    pub deadline: Duration,
}

/// How a script run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Exit code; `124` when the deadline fired, `128 + n` when killed by signal `n`.
    pub exit_code: i32,
    /// Whether the deadline fired.
    pub timed_out: bool,
    /// Wall-clock time the child ran.
    pub duration: Duration,
}

/// Trait for test script runners.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs the script to completion or until the deadline.
    ///
    /// Only failing to start the script is an error; any exit status,
    /// including a timeout, is reported in the outcome.
    async fn run(&self, launch: ScriptLaunch) -> Result<ScriptOutcome>;

    /// Returns the name of this runner.
    fn name(&self) -> &str;
}
