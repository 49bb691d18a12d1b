//! `adb` backed device controller.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::DeviceConfig;
use crate::error::{Error, Result};

use super::DeviceController;

/// Controller driving a device through the `adb` CLI.
pub struct AdbDevice {
    config: DeviceConfig,
}

impl AdbDevice {
    /// Creates a controller from device settings.
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    /// Builds the full argument list, prefixed with `-s <serial>` when set.
    fn build_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.config.serial {
            full.push("-s".to_string());
            full.push(serial.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.config.program, self.build_args(args).join(" "))
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.build_args(args))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Runs the tool and captures its output without checking the status.
    async fn output(&self, args: &[&str], timeout: Duration) -> Result<Output> {
        let describe = self.describe(args);
        tracing::debug!(command = %describe, "running device command");

        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(Error::Device {
                command: describe,
                reason: format!("failed to run: {}", e),
            }),
            Err(_) => Err(Error::DeviceTimeout {
                command: describe,
                timeout,
            }),
        }
    }

    /// Runs the tool and fails unless it exits successfully.
    async fn checked(&self, args: &[&str], timeout: Duration) -> Result<Output> {
        let output = self.output(args, timeout).await?;
        if !output.status.success() {
            return Err(Error::Device {
                command: self.describe(args),
                reason: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl DeviceController for AdbDevice {
    async fn is_reachable(&self) -> Result<bool> {
        let output = self.output(&["shell", "true"], self.config.query_timeout()).await?;
        if !output.status.success() {
            tracing::warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "device probe failed"
            );
        }
        Ok(output.status.success())
    }

    async fn shell(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        let output = self.checked(&full, self.config.query_timeout()).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn get_property(&self, name: &str) -> Result<String> {
        self.shell(&["getprop", name]).await
    }

    async fn clear_log(&self) -> Result<()> {
        self.checked(&["logcat", "-c"], self.config.log_clear_timeout())
            .await?;
        Ok(())
    }

    async fn dump_log(&self, dest: &Path) -> Result<()> {
        let args = ["logcat", "-d"];
        let describe = self.describe(&args);
        let timeout = self.config.log_dump_timeout();

        let file = std::fs::File::create(dest)?;
        let mut child = self
            .command(&args)
            .stdout(Stdio::from(file))
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Device {
                command: describe.clone(),
                reason: format!("failed to run: {}", e),
            })?;

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::DeviceTimeout {
                    command: describe,
                    timeout,
                });
            }
        };

        if !status.success() {
            return Err(Error::Device {
                command: describe,
                reason: format!("exited with {}", status),
            });
        }

        tracing::debug!(dest = ?dest, "dumped device log");
        Ok(())
    }

    async fn press_key(&self, keycode: u32) -> Result<()> {
        let code = keycode.to_string();
        self.checked(
            &["shell", "input", "keyevent", code.as_str()],
            self.config.key_timeout(),
        )
        .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "adb"
    }
}
