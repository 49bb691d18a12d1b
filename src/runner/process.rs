//! Local child-process runner.

use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::verdict::TIMEOUT_EXIT_CODE;

use super::{ScriptLaunch, ScriptOutcome, ScriptRunner};

/// Runs the script as a child process in its own process group.
///
/// On deadline expiry, or when the run is dropped part way (the binary does
/// this on SIGINT/SIGTERM), the whole group is killed so grandchildren do
/// not outlive the run.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        Self
    }

    fn build_command(&self, launch: &ScriptLaunch) -> Result<Command> {
        let stdout = std::fs::File::create(&launch.stdout_path)?;
        let stderr = std::fs::File::create(&launch.stderr_path)?;

        let mut cmd = Command::new(&launch.script);
        cmd.args(&launch.args)
            .current_dir(&launch.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        Ok(cmd)
    }
}

/// Test script leading its own process group.
///
/// Dropping it while the script is still running kills the group.
struct ProcessGroup {
    child: Child,
}

impl ProcessGroup {
    /// Sends SIGKILL to every process in the group.
    fn kill_group(&self) {
        // Reaped children have no id, so a recycled pgid is never signalled
        let Some(pid) = self.child.id() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            // The group id is the leader's pid because of process_group(0)
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => tracing::warn!(error = %e, pid, "failed to kill test process group"),
            }
        }
        #[cfg(not(unix))]
        let _ = pid;
    }

    /// Kills the group, then the leader, and reaps it.
    async fn kill(&mut self) {
        self.kill_group();
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "failed to kill test script");
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.child.id().is_some() {
            tracing::warn!("test script abandoned while running, killing its process group");
            self.kill_group();
        }
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    async fn run(&self, launch: ScriptLaunch) -> Result<ScriptOutcome> {
        let mut cmd = self.build_command(&launch)?;

        tracing::info!(
            script = ?launch.script,
            working_dir = ?launch.working_dir,
            deadline_secs = launch.deadline.as_secs(),
            "launching test script"
        );

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| Error::Launch {
            script: launch.script.clone(),
            reason: e.to_string(),
        })?;
        let mut group = ProcessGroup { child };

        let waited = tokio::select! {
            status = group.child.wait() => Some(status),
            _ = tokio::time::sleep(launch.deadline) => None,
        };

        match waited {
            Some(status) => {
                let exit_code = exit_code_of(status?);
                tracing::info!(exit_code, elapsed = ?start.elapsed(), "test script exited");
                Ok(ScriptOutcome {
                    exit_code,
                    timed_out: false,
                    duration: start.elapsed(),
                })
            }
            None => {
                tracing::warn!(deadline = ?launch.deadline, "test script exceeded deadline, killing");
                group.kill().await;
                Ok(ScriptOutcome {
                    exit_code: TIMEOUT_EXIT_CODE,
                    timed_out: true,
                    duration: start.elapsed(),
                })
            }
        }
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Maps an exit status to a shell-style exit code.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
