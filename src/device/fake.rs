//! In-memory device controller for tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::DeviceController;

/// Kind of device operation, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    Probe,
    Shell,
    GetProperty,
    ClearLog,
    DumpLog,
    PressKey,
}

/// A recorded call against a [`FakeDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Probe,
    Shell(Vec<String>),
    GetProperty(String),
    ClearLog,
    DumpLog(PathBuf),
    PressKey(u32),
}

impl DeviceCall {
    /// Returns the operation kind of this call.
    pub fn op(&self) -> DeviceOp {
        match self {
            DeviceCall::Probe => DeviceOp::Probe,
            DeviceCall::Shell(_) => DeviceOp::Shell,
            DeviceCall::GetProperty(_) => DeviceOp::GetProperty,
            DeviceCall::ClearLog => DeviceOp::ClearLog,
            DeviceCall::DumpLog(_) => DeviceOp::DumpLog,
            DeviceCall::PressKey(_) => DeviceOp::PressKey,
        }
    }
}

/// Scripted device that records every call.
pub struct FakeDevice {
    reachable: bool,
    fingerprint: String,
    log: String,
    failing: HashSet<DeviceOp>,
    calls: Mutex<Vec<DeviceCall>>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    /// Creates a reachable fake device.
    pub fn new() -> Self {
        Self {
            reachable: true,
            fingerprint: "google/fake/fake:14/AP1A/1:userdebug/test-keys".to_string(),
            log: String::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a device whose probe fails.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    /// Sets the content written by `dump_log`.
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    /// Makes every call of the given kind fail.
    pub fn failing_on(mut self, op: DeviceOp) -> Self {
        self.failing.insert(op);
        self
    }

    /// Returns the calls made so far, in order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: DeviceCall) -> Result<()> {
        let op = call.op();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing.contains(&op) {
            return Err(Error::Device {
                command: format!("{:?}", op),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceController for FakeDevice {
    async fn is_reachable(&self) -> Result<bool> {
        self.record(DeviceCall::Probe)?;
        Ok(self.reachable)
    }

    async fn shell(&self, args: &[&str]) -> Result<String> {
        self.record(DeviceCall::Shell(
            args.iter().map(|a| a.to_string()).collect(),
        ))?;
        Ok(String::new())
    }

    async fn get_property(&self, name: &str) -> Result<String> {
        self.record(DeviceCall::GetProperty(name.to_string()))?;
        Ok(format!("{}\n", self.fingerprint))
    }

    async fn clear_log(&self) -> Result<()> {
        self.record(DeviceCall::ClearLog)
    }

    async fn dump_log(&self, dest: &Path) -> Result<()> {
        self.record(DeviceCall::DumpLog(dest.to_path_buf()))?;
        std::fs::write(dest, &self.log)?;
        Ok(())
    }

    async fn press_key(&self, keycode: u32) -> Result<()> {
        self.record(DeviceCall::PressKey(keycode))
    }

    fn name(&self) -> &str {
        "fake"
    }
}
