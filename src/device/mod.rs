//! Device control for the attached test device.
//!
//! The harness never shells out to the device tool directly; every step
//! goes through a [`DeviceController`] so tests can substitute a fake.

mod adb;
mod fake;

pub use adb::AdbDevice;
pub use fake::{DeviceCall, DeviceOp, FakeDevice};

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Build property identifying the software running on the device.
pub const FINGERPRINT_PROPERTY: &str = "ro.build.fingerprint";

/// Operations the harness needs from the device-control tool.
///
/// Every call is bounded by a short timeout owned by the implementation.
/// A call that fails or times out returns an error.
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Returns true if exactly one device answers.
    async fn is_reachable(&self) -> Result<bool>;

    /// Runs a shell command on the device and returns its standard output.
    async fn shell(&self, args: &[&str]) -> Result<String>;

    /// Reads a system property.
    async fn get_property(&self, name: &str) -> Result<String>;

    /// Clears the device log buffer.
    async fn clear_log(&self) -> Result<()>;

    /// Writes the device log buffer to `dest`.
    async fn dump_log(&self, dest: &Path) -> Result<()>;

    /// Injects a key event.
    async fn press_key(&self, keycode: u32) -> Result<()>;

    /// Returns the name of this controller.
    fn name(&self) -> &str;
}
