//! Invocation parameters and the per-test descriptor.
//!
//! The harness is invoked with a timeout and two directories. Everything it
//! needs to locate on disk is resolved once, up front, into a [`Workspace`]
//! of absolute paths so that later steps never depend on the process cwd.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::error::{Error, Result};

/// Parameters the harness was invoked with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Total task budget, in seconds.
    pub timeout_secs: u64,
    /// Directory of the test to run.
    pub test_dir: PathBuf,
    /// Directory receiving the run's artifacts.
    pub out_dir: PathBuf,
}

impl Invocation {
    /// Creates a new invocation.
    pub fn new(timeout_secs: u64, test_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            timeout_secs,
            test_dir: test_dir.into(),
            out_dir: out_dir.into(),
        }
    }

    /// Total task budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the time the test script may run, leaving `reserve` for cleanup.
    ///
    /// Fails when the budget does not exceed the reserve.
    pub fn test_deadline(&self, reserve: Duration) -> Result<Duration> {
        let timeout = self.timeout();
        if timeout <= reserve {
            return Err(Error::Precondition(format!(
                "timeout must be higher than the time for cleanup duration ({} sec)",
                reserve.as_secs()
            )));
        }
        Ok(timeout - reserve)
    }
}

/// Absolute paths of everything a run touches on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Test directory, also the script's working directory.
    pub test_dir: PathBuf,
    /// Output directory.
    pub out_dir: PathBuf,
    /// Directory the descriptor's `script` is resolved against.
    pub scripts_dir: PathBuf,
    /// Build under test, passed as the script's first argument.
    pub build_dir: PathBuf,
}

impl Workspace {
    /// Validates the directories of an invocation and makes them absolute.
    ///
    /// Relative paths are resolved against `base`, the harness working
    /// directory.
    pub fn resolve(invocation: &Invocation, layout: &LayoutConfig, base: &Path) -> Result<Self> {
        let test_dir = require_dir("test directory", &absolute(base, &invocation.test_dir))?;
        let out_dir = require_dir("output directory", &absolute(base, &invocation.out_dir))?;
        let scripts_dir = require_dir("scripts directory", &absolute(base, &layout.scripts_dir))?;
        let build_dir = require_dir("build directory", &absolute(base, &layout.build_dir))?;

        Ok(Self {
            test_dir,
            out_dir,
            scripts_dir,
            build_dir,
        })
    }

    /// Captured standard output of the test.
    pub fn stdout_path(&self) -> PathBuf {
        self.out_dir.join("stdout.txt")
    }

    /// Captured standard error of the test.
    pub fn stderr_path(&self) -> PathBuf {
        self.out_dir.join("stderr.txt")
    }

    /// Device log dump.
    pub fn logcat_path(&self) -> PathBuf {
        self.out_dir.join("logcat.txt")
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn require_dir(what: &'static str, path: &Path) -> Result<PathBuf> {
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::MissingPath {
            what,
            path: path.to_path_buf(),
        })
    }
}

/// Test descriptor read from the test directory.
///
/// Only `script` is interpreted; other keys are tolerated and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    /// Script path relative to the scripts directory.
    pub script: String,
}

impl TestDescriptor {
    /// Loads the descriptor from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let params_error = |reason: String| Error::Params {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(Error::MissingPath {
                what: "test parameters file",
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read(path)?;
        let value: serde_json::Value = serde_json::from_slice(&content)
            .map_err(|e| params_error(format!("not valid JSON: {}", e)))?;

        if !value.is_object() {
            return Err(params_error("expected a JSON object".to_string()));
        }

        match value.get("script") {
            None => Err(params_error("missing required key 'script'".to_string())),
            Some(serde_json::Value::String(script)) if !script.is_empty() => Ok(Self {
                script: script.clone(),
            }),
            Some(other) => Err(params_error(format!(
                "'script' must be a non-empty string, got {}",
                other
            ))),
        }
    }

    /// Loads the descriptor named by `layout` from the test directory.
    pub fn load_from(workspace: &Workspace, layout: &LayoutConfig) -> Result<Self> {
        Self::load(workspace.test_dir.join(&layout.params_file))
    }

    /// Resolves the script against `scripts_dir` and checks that it exists.
    pub fn resolve_script(&self, scripts_dir: &Path) -> Result<PathBuf> {
        let script = absolute(scripts_dir, Path::new(&self.script));
        if !script.is_file() {
            return Err(Error::MissingPath {
                what: "test script",
                path: script,
            });
        }
        Ok(script)
    }
}
