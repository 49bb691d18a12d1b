//! Harness configuration.
//!
//! Every knob has a default matching the bot layout, so the harness runs
//! without a config file. A TOML file can override any subset of fields, and
//! configuration is validated before the run to catch errors early.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Seconds held back from the task timeout for device cleanup.
pub const DEFAULT_CLEANUP_RESERVE_SECS: u64 = 15;

/// Android key code that turns the screen on without toggling it.
pub const KEYCODE_WAKEUP: u32 = 224;

/// Android key code that toggles the screen.
pub const KEYCODE_POWER: u32 = 26;

/// What to do when a device call after the test fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Log the failure and keep going; the test verdict still stands.
    #[default]
    BestEffort,
    /// Abort the run with a harness failure.
    FailFast,
}

impl std::str::FromStr for CleanupPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "best-effort" => Ok(CleanupPolicy::BestEffort),
            "fail-fast" => Ok(CleanupPolicy::FailFast),
            other => Err(Error::Config(format!(
                "unknown cleanup policy '{}' (expected best-effort or fail-fast)",
                other
            ))),
        }
    }
}

/// Directory layout of the bot working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Directory holding the test scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Directory holding the build under test.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Name of the test descriptor inside the test directory.
    #[serde(default = "default_params_file")]
    pub params_file: String,
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("bot-scripts")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("agi")
}

fn default_params_file() -> String {
    "params.json".to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            build_dir: default_build_dir(),
            params_file: default_params_file(),
        }
    }
}

/// Device-control tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path or name of the device-control program.
    #[serde(default = "default_program")]
    pub program: String,
    /// Device serial; when unset the tool picks the only attached device.
    #[serde(default)]
    pub serial: Option<String>,
    /// Timeout for the reachability probe and property reads, in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    /// Timeout for clearing the log buffer, in seconds.
    #[serde(default = "default_query_timeout")]
    pub log_clear_timeout_secs: u64,
    /// Timeout for dumping the log buffer, in seconds.
    #[serde(default = "default_log_dump_timeout")]
    pub log_dump_timeout_secs: u64,
    /// Timeout for a single key press, in seconds.
    #[serde(default = "default_key_timeout")]
    pub key_timeout_secs: u64,
}

fn default_program() -> String {
    "adb".to_string()
}

fn default_query_timeout() -> u64 {
    10
}

fn default_log_dump_timeout() -> u64 {
    5
}

fn default_key_timeout() -> u64 {
    2
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            serial: None,
            query_timeout_secs: default_query_timeout(),
            log_clear_timeout_secs: default_query_timeout(),
            log_dump_timeout_secs: default_log_dump_timeout(),
            key_timeout_secs: default_key_timeout(),
        }
    }
}

impl DeviceConfig {
    /// Timeout for probes and property reads.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Timeout for `logcat -c`.
    pub fn log_clear_timeout(&self) -> Duration {
        Duration::from_secs(self.log_clear_timeout_secs)
    }

    /// Timeout for `logcat -d`.
    pub fn log_dump_timeout(&self) -> Duration {
        Duration::from_secs(self.log_dump_timeout_secs)
    }

    /// Timeout for `input keyevent`.
    pub fn key_timeout(&self) -> Duration {
        Duration::from_secs(self.key_timeout_secs)
    }
}

/// Screen reset sequence run after the test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Key that wakes the screen.
    #[serde(default = "default_wake_keycode")]
    pub wake_keycode: u32,
    /// Key that toggles the screen off.
    #[serde(default = "default_power_keycode")]
    pub power_keycode: u32,
    /// Pause between the two presses, in milliseconds.
    #[serde(default = "default_wake_pause_ms")]
    pub wake_pause_ms: u64,
}

fn default_wake_keycode() -> u32 {
    KEYCODE_WAKEUP
}

fn default_power_keycode() -> u32 {
    KEYCODE_POWER
}

fn default_wake_pause_ms() -> u64 {
    2000
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            wake_keycode: default_wake_keycode(),
            power_keycode: default_power_keycode(),
            wake_pause_ms: default_wake_pause_ms(),
        }
    }
}

impl DisplayConfig {
    /// Pause that lets the wake animation finish.
    pub fn wake_pause(&self) -> Duration {
        Duration::from_millis(self.wake_pause_ms)
    }
}

/// Trace salvage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalvageConfig {
    /// File extension (without dot) of artifacts to recover.
    #[serde(default = "default_salvage_extension")]
    pub extension: String,
    /// Directory created under the output directory.
    #[serde(default = "default_salvage_dir")]
    pub dir_name: String,
}

fn default_salvage_extension() -> String {
    "gfxtrace".to_string()
}

fn default_salvage_dir() -> String {
    "harness-salvage".to_string()
}

impl Default for SalvageConfig {
    fn default() -> Self {
        Self {
            extension: default_salvage_extension(),
            dir_name: default_salvage_dir(),
        }
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Seconds reserved for post-test cleanup out of the task timeout.
    #[serde(default = "default_cleanup_reserve")]
    pub cleanup_reserve_secs: u64,
    /// Handling of device failures after the test ran.
    #[serde(default)]
    pub cleanup_policy: CleanupPolicy,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub salvage: SalvageConfig,
}

fn default_cleanup_reserve() -> u64 {
    DEFAULT_CLEANUP_RESERVE_SECS
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cleanup_reserve_secs: default_cleanup_reserve(),
            cleanup_policy: CleanupPolicy::default(),
            layout: LayoutConfig::default(),
            device: DeviceConfig::default(),
            display: DisplayConfig::default(),
            salvage: SalvageConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Cleanup reserve as a duration.
    pub fn cleanup_reserve(&self) -> Duration {
        Duration::from_secs(self.cleanup_reserve_secs)
    }

    /// Sets the cleanup policy.
    pub fn with_cleanup_policy(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup_policy = policy;
        self
    }

    /// Sets the cleanup reserve.
    pub fn with_cleanup_reserve_secs(mut self, secs: u64) -> Self {
        self.cleanup_reserve_secs = secs;
        self
    }

    /// Sets the pause between the wake and power key presses.
    pub fn with_wake_pause_ms(mut self, ms: u64) -> Self {
        self.display.wake_pause_ms = ms;
        self
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for HarnessConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.cleanup_reserve_secs == 0 {
            result.add_error("cleanup_reserve_secs must be at least 1");
        }

        // Post-test device calls plus the wake pause must fit in the reserve
        let cleanup_budget = self.device.log_dump_timeout_secs
            + 2 * self.device.key_timeout_secs
            + self.display.wake_pause_ms / 1000;
        if cleanup_budget > self.cleanup_reserve_secs {
            result.add_warning(format!(
                "post-test device calls may take {}s, more than the {}s cleanup reserve",
                cleanup_budget, self.cleanup_reserve_secs
            ));
        }

        if self.device.program.trim().is_empty() {
            result.add_error("device.program cannot be empty");
        }

        if let Some(serial) = &self.device.serial {
            if serial.trim().is_empty() {
                result.add_error("device.serial cannot be empty when set");
            }
        }

        for (name, value) in [
            ("query_timeout_secs", self.device.query_timeout_secs),
            ("log_clear_timeout_secs", self.device.log_clear_timeout_secs),
            ("log_dump_timeout_secs", self.device.log_dump_timeout_secs),
            ("key_timeout_secs", self.device.key_timeout_secs),
        ] {
            if value == 0 {
                result.add_error(format!("device.{} must be at least 1", name));
            }
        }

        if self.layout.params_file.is_empty() || self.layout.params_file.contains('/') {
            result.add_error("layout.params_file must be a bare file name");
        }

        let ext = &self.salvage.extension;
        if ext.is_empty() || ext.starts_with('.') || ext.contains('/') {
            result.add_error("salvage.extension must be a non-empty extension without dot");
        }

        if self.salvage.dir_name.is_empty() || self.salvage.dir_name.contains('/') {
            result.add_error("salvage.dir_name must be a bare directory name");
        }

        if self.cleanup_policy == CleanupPolicy::FailFast {
            result.add_warning(
                "cleanup_policy = fail-fast discards the verdict when a post-test device call fails",
            );
        }

        result
    }
}
