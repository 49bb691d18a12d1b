//! Bot Harness - Swarming task harness for device tests
//!
//! This library validates a bot's inputs and attached device, runs one test
//! script against the device under a deadline, collects its output and the
//! device log, resets the device, and derives a PASS/FAIL/TIMEOUT verdict.

pub mod config;
pub mod device;
pub mod error;
pub mod harness;
pub mod params;
pub mod runner;
pub mod salvage;
pub mod signal;
pub mod verdict;

pub use config::{CleanupPolicy, HarnessConfig, Validate, ValidationResult};
pub use device::{AdbDevice, DeviceCall, DeviceController, DeviceOp, FakeDevice};
pub use error::{Error, Result};
pub use harness::{Harness, PreparedRun, RunReport};
pub use params::{Invocation, TestDescriptor, Workspace};
pub use runner::{ProcessRunner, ScriptLaunch, ScriptOutcome, ScriptRunner};
pub use salvage::{find_artifacts, salvage_artifacts};
pub use signal::shutdown_signal;
pub use verdict::{Verdict, TIMEOUT_EXIT_CODE};
