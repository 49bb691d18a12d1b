//! The harness run: validate, drive the device, run the test, report.
//!
//! A run is strictly sequential. Preconditions are checked before anything
//! touches the device; device calls before the test are always fatal, while
//! device calls after the test follow the configured [`CleanupPolicy`].

use std::fmt::Display;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::config::{CleanupPolicy, HarnessConfig};
use crate::device::{DeviceController, FINGERPRINT_PROPERTY};
use crate::error::{Error, Result};
use crate::params::{Invocation, TestDescriptor, Workspace};
use crate::runner::{ScriptLaunch, ScriptOutcome, ScriptRunner};
use crate::salvage::salvage_artifacts;
use crate::verdict::Verdict;

/// Everything validated before the device is touched.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    /// Absolute paths of the run.
    pub workspace: Workspace,
    /// Absolute path of the test script.
    pub script: PathBuf,
    /// Time the script may run.
    pub deadline: Duration,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier attached to this run's logs.
    pub run_id: String,
    /// Final verdict.
    pub verdict: Verdict,
    /// How the test script ended.
    pub outcome: ScriptOutcome,
    /// Trace files moved into the salvage directory.
    pub salvaged: Vec<PathBuf>,
    /// Post-test steps that failed under the best-effort policy.
    pub cleanup_failures: Vec<String>,
    /// Wall-clock duration of the whole run.
    pub elapsed: Duration,
}

impl RunReport {
    /// Exit code the harness process should return.
    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }
}

/// Runs one test against one device.
pub struct Harness<D: DeviceController, R: ScriptRunner> {
    device: D,
    runner: R,
    config: HarnessConfig,
    base_dir: PathBuf,
    console: Mutex<Box<dyn Write + Send>>,
}

impl<D: DeviceController, R: ScriptRunner> Harness<D, R> {
    /// Creates a harness with default configuration.
    ///
    /// `base_dir` is the bot working directory that relative paths, including
    /// the scripts and build directories, are resolved against.
    pub fn new(device: D, runner: R, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            device,
            runner,
            config: HarnessConfig::default(),
            base_dir: base_dir.into(),
            console: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Redirects the operator report, which goes to stdout by default.
    pub fn with_console(mut self, console: impl Write + Send + 'static) -> Self {
        self.console = Mutex::new(Box::new(console));
        self
    }

    /// Returns the device controller.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs the full sequence and returns the report.
    ///
    /// An error means the run was aborted by the harness itself; test
    /// failures and timeouts are reported through the verdict.
    pub async fn run(&self, invocation: &Invocation) -> Result<RunReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.run_inner(run_id, invocation).instrument(span).await
    }

    /// Validates the invocation without touching the device.
    pub fn prepare(&self, invocation: &Invocation) -> Result<PreparedRun> {
        let workspace = Workspace::resolve(invocation, &self.config.layout, &self.base_dir)?;

        let descriptor = TestDescriptor::load_from(&workspace, &self.config.layout)?;
        let script = descriptor.resolve_script(&workspace.scripts_dir)?;

        let deadline = invocation.test_deadline(self.config.cleanup_reserve())?;

        Ok(PreparedRun {
            workspace,
            script,
            deadline,
        })
    }

    async fn run_inner(&self, run_id: String, invocation: &Invocation) -> Result<RunReport> {
        let start = Instant::now();
        let prepared = self.prepare(invocation)?;
        let ws = &prepared.workspace;

        tracing::info!(
            test_dir = ?ws.test_dir,
            script = ?prepared.script,
            device = self.device.name(),
            runner = self.runner.name(),
            "preconditions satisfied"
        );

        // Pre-test device steps: any failure aborts before the test runs
        if !self.device.is_reachable().await? {
            return Err(Error::Precondition(
                "zero or more than one device connected".to_string(),
            ));
        }

        let fingerprint = self.device.get_property(FINGERPRINT_PROPERTY).await?;
        self.say(format!("Device fingerprint: {}", fingerprint.trim_end()));

        self.device.clear_log().await?;

        self.say(format!(
            "Start test script \"{}\" with timeout of {} seconds",
            prepared.script.display(),
            prepared.deadline.as_secs()
        ));

        let launch = ScriptLaunch {
            script: prepared.script.clone(),
            args: vec![
                ws.build_dir.clone().into_os_string(),
                ws.out_dir.clone().into_os_string(),
            ],
            working_dir: ws.test_dir.clone(),
            stdout_path: ws.stdout_path(),
            stderr_path: ws.stderr_path(),
            deadline: prepared.deadline,
        };
        let outcome = self.runner.run(launch).await?;

        // Post-test steps
        let mut failures = Vec::new();

        let logcat = ws.logcat_path();
        self.post_test("dump device log", self.device.dump_log(&logcat), &mut failures)
            .await?;

        self.echo_capture("stdout", &ws.stdout_path())?;
        self.echo_capture("stderr", &ws.stderr_path())?;
        self.say("#### Test returncode:");
        self.say(outcome.exit_code);

        self.reset_display(&mut failures).await?;

        let salvaged = self
            .post_test(
                "salvage trace files",
                async { salvage_artifacts(&ws.test_dir, &ws.out_dir, &self.config.salvage) },
                &mut failures,
            )
            .await?
            .unwrap_or_default();

        let verdict = Verdict::from_exit_code(outcome.exit_code);
        self.say("#### Test status:");
        self.say(verdict.label());

        if verdict == Verdict::Timeout {
            self.say(
                "Sleep a bit more to trigger a Swarming-level timeout, to disambiguate a timeout from a crash",
            );
            tokio::time::sleep(self.config.cleanup_reserve()).await;
        }

        let elapsed = start.elapsed();
        tracing::info!(
            verdict = %verdict,
            exit_code = verdict.exit_code(),
            salvaged = salvaged.len(),
            cleanup_failures = failures.len(),
            elapsed = ?elapsed,
            "run finished"
        );

        Ok(RunReport {
            run_id,
            verdict,
            outcome,
            salvaged,
            cleanup_failures: failures,
            elapsed,
        })
    }

    /// Wakes the screen, waits for the animation, then turns it off.
    ///
    /// The power key toggles, so waking first guarantees it ends up off.
    async fn reset_display(&self, failures: &mut Vec<String>) -> Result<()> {
        let display = &self.config.display;

        self.post_test(
            "press wake key",
            self.device.press_key(display.wake_keycode),
            failures,
        )
        .await?;

        tokio::time::sleep(display.wake_pause()).await;

        self.post_test(
            "press power key",
            self.device.press_key(display.power_keycode),
            failures,
        )
        .await?;

        Ok(())
    }

    /// Runs a post-test step under the cleanup policy.
    ///
    /// Returns `Ok(None)` when the step failed and the policy let the run
    /// continue.
    async fn post_test<T, F>(
        &self,
        step: &str,
        fut: F,
        failures: &mut Vec<String>,
    ) -> Result<Option<T>>
    where
        F: Future<Output = Result<T>>,
    {
        match fut.await {
            Ok(value) => Ok(Some(value)),
            Err(e) => match self.config.cleanup_policy {
                CleanupPolicy::FailFast => {
                    tracing::error!(step, error = %e, "post-test step failed, aborting");
                    Err(e)
                }
                CleanupPolicy::BestEffort => {
                    tracing::warn!(step, error = %e, "post-test step failed, continuing");
                    failures.push(format!("{}: {}", step, e));
                    Ok(None)
                }
            },
        }
    }

    fn echo_capture(&self, stream: &str, path: &Path) -> Result<()> {
        let content = std::fs::read(path)?;
        self.say(format!("#### Test {}:", stream));
        self.say(String::from_utf8_lossy(&content));
        Ok(())
    }

    /// Writes one line of the operator report.
    fn say(&self, line: impl Display) {
        if let Ok(mut console) = self.console.lock() {
            let _ = writeln!(console, "{}", line);
            let _ = console.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, DeviceOp, FakeDevice};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Report sink shared between the harness and the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Runner that writes canned output instead of spawning a process.
    struct CannedRunner {
        exit_code: i32,
        stdout: &'static [u8],
        stderr: &'static [u8],
        leave_trace: bool,
        seen: Mutex<Option<ScriptLaunch>>,
    }

    impl CannedRunner {
        fn exiting(exit_code: i32) -> Self {
            Self {
                exit_code,
                stdout: b"hello from test\n",
                stderr: b"",
                leave_trace: false,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ScriptRunner for CannedRunner {
        async fn run(&self, launch: ScriptLaunch) -> Result<ScriptOutcome> {
            std::fs::write(&launch.stdout_path, self.stdout)?;
            std::fs::write(&launch.stderr_path, self.stderr)?;
            if self.leave_trace {
                std::fs::write(launch.working_dir.join("frame.gfxtrace"), b"trace")?;
            }
            *self.seen.lock().unwrap() = Some(launch);
            Ok(ScriptOutcome {
                exit_code: self.exit_code,
                timed_out: self.exit_code == crate::verdict::TIMEOUT_EXIT_CODE,
                duration: Duration::from_millis(5),
            })
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    /// Creates the bot layout with one test whose script exists.
    fn bot_dir() -> TempDir {
        let dir = TempDir::new().expect("failed to create temp dir");
        for sub in ["bot-scripts", "agi", "tests/smoke", "out"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        std::fs::write(dir.path().join("bot-scripts/smoke.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(
            dir.path().join("tests/smoke/params.json"),
            r#"{"script": "smoke.sh"}"#,
        )
        .unwrap();
        dir
    }

    fn harness(
        bot: &TempDir,
        device: FakeDevice,
        runner: CannedRunner,
    ) -> (Harness<FakeDevice, CannedRunner>, Captured) {
        let console = Captured::default();
        let harness = Harness::new(device, runner, bot.path()).with_console(console.clone());
        (harness, console)
    }

    fn invocation(timeout_secs: u64) -> Invocation {
        Invocation::new(timeout_secs, "tests/smoke", "out")
    }

    #[tokio::test(start_paused = true)]
    async fn passing_test_runs_full_sequence() {
        let bot = bot_dir();
        let (harness, console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(0));

        let report = harness.run(&invocation(30)).await.unwrap();

        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(report.exit_code(), 0);
        assert!(report.cleanup_failures.is_empty());
        assert!(report.salvaged.is_empty());

        let logcat = bot.path().join("out/logcat.txt");
        assert_eq!(
            harness.device().calls(),
            vec![
                DeviceCall::Probe,
                DeviceCall::GetProperty("ro.build.fingerprint".to_string()),
                DeviceCall::ClearLog,
                DeviceCall::DumpLog(logcat.clone()),
                DeviceCall::PressKey(224),
                DeviceCall::PressKey(26),
            ]
        );
        assert!(logcat.exists());

        let text = console.text();
        assert!(text.contains("Device fingerprint: google/fake"));
        assert!(text.contains("with timeout of 15 seconds"));
        assert!(text.contains("#### Test stdout:\nhello from test\n"));
        assert!(text.contains("#### Test returncode:\n0\n"));
        assert!(text.ends_with("#### Test status:\nPASS\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn script_receives_absolute_dirs_and_cwd() {
        let bot = bot_dir();
        let (harness, _console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(0));

        harness.run(&invocation(100)).await.unwrap();

        let seen = harness.runner.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.script, bot.path().join("bot-scripts/smoke.sh"));
        assert_eq!(
            seen.args,
            vec![
                bot.path().join("agi").into_os_string(),
                bot.path().join("out").into_os_string()
            ]
        );
        assert_eq!(seen.working_dir, bot.path().join("tests/smoke"));
        assert_eq!(seen.deadline, Duration::from_secs(85));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_test_returns_its_code() {
        let bot = bot_dir();
        let (harness, console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(3));

        let report = harness.run(&invocation(30)).await.unwrap();

        assert_eq!(report.verdict, Verdict::Fail(3));
        assert_eq!(report.exit_code(), 3);
        assert!(console.text().ends_with("FAIL\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_sleeps_out_the_reserve() {
        let bot = bot_dir();
        let (harness, console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(124));

        let start = tokio::time::Instant::now();
        let report = harness.run(&invocation(30)).await.unwrap();

        assert_eq!(report.verdict, Verdict::Timeout);
        assert_eq!(report.exit_code(), 124);
        // 2s wake pause + 15s reserve
        assert!(start.elapsed() >= Duration::from_secs(17));
        assert!(console.text().contains("TIMEOUT\nSleep a bit more"));
    }

    #[tokio::test]
    async fn small_budget_touches_nothing() {
        let bot = bot_dir();
        let (harness, _console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(0));

        let err = harness.run(&invocation(15)).await.unwrap_err();

        assert!(matches!(err, Error::Precondition(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(harness.device().calls().is_empty());
        assert!(harness.runner.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn bad_params_abort_before_probe() {
        let bot = bot_dir();
        std::fs::write(bot.path().join("tests/smoke/params.json"), r#"{"name": "x"}"#).unwrap();
        let (harness, _console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(0));

        let err = harness.run(&invocation(30)).await.unwrap_err();

        assert!(matches!(err, Error::Params { .. }));
        assert!(harness.device().calls().is_empty());
    }

    #[tokio::test]
    async fn missing_script_aborts_before_probe() {
        let bot = bot_dir();
        std::fs::remove_file(bot.path().join("bot-scripts/smoke.sh")).unwrap();
        let (harness, _console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(0));

        let err = harness.run(&invocation(30)).await.unwrap_err();

        assert!(matches!(err, Error::MissingPath { what: "test script", .. }));
        assert!(harness.device().calls().is_empty());
    }

    #[tokio::test]
    async fn unreachable_device_stops_after_probe() {
        let bot = bot_dir();
        let (harness, _console) = harness(&bot, FakeDevice::unreachable(), CannedRunner::exiting(0));

        let err = harness.run(&invocation(30)).await.unwrap_err();

        assert_eq!(err.to_string(), "zero or more than one device connected");
        assert_eq!(harness.device().calls(), vec![DeviceCall::Probe]);
        assert!(harness.runner.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn log_clear_failure_is_fatal_before_test() {
        let bot = bot_dir();
        let device = FakeDevice::new().failing_on(DeviceOp::ClearLog);
        let (harness, _console) = harness(&bot, device, CannedRunner::exiting(0));

        let err = harness.run(&invocation(30)).await.unwrap_err();

        assert!(err.is_device_error());
        assert!(harness.runner.seen.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn best_effort_cleanup_keeps_verdict() {
        let bot = bot_dir();
        let device = FakeDevice::new().failing_on(DeviceOp::PressKey);
        let (harness, console) = harness(&bot, device, CannedRunner::exiting(0));

        let report = harness.run(&invocation(30)).await.unwrap();

        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(report.cleanup_failures.len(), 2);
        assert!(report.cleanup_failures[0].starts_with("press wake key"));
        assert!(console.text().ends_with("PASS\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_cleanup_aborts() {
        let bot = bot_dir();
        let device = FakeDevice::new().failing_on(DeviceOp::DumpLog);
        let runner = CannedRunner::exiting(0);
        let config = HarnessConfig::default().with_cleanup_policy(CleanupPolicy::FailFast);
        let console = Captured::default();
        let harness = Harness::new(device, runner, bot.path())
            .with_config(config)
            .with_console(console.clone());

        let err = harness.run(&invocation(30)).await.unwrap_err();

        assert!(err.is_device_error());
        assert!(!console.text().contains("#### Test status:"));
        assert!(!harness
            .device()
            .calls()
            .iter()
            .any(|c| matches!(c, DeviceCall::PressKey(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn trace_left_in_test_dir_is_salvaged() {
        let bot = bot_dir();
        let runner = CannedRunner {
            leave_trace: true,
            ..CannedRunner::exiting(1)
        };
        let (harness, _console) = harness(&bot, FakeDevice::new(), runner);

        let report = harness.run(&invocation(30)).await.unwrap();

        let dest = bot.path().join("out/harness-salvage/frame.gfxtrace");
        assert_eq!(report.salvaged, vec![dest.clone()]);
        assert_eq!(std::fs::read(&dest).unwrap(), b"trace");
        assert!(!bot.path().join("tests/smoke/frame.gfxtrace").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn non_utf8_output_is_echoed_lossily() {
        let bot = bot_dir();
        let runner = CannedRunner {
            stderr: b"bad \xff byte\n",
            ..CannedRunner::exiting(0)
        };
        let (harness, console) = harness(&bot, FakeDevice::new(), runner);

        harness.run(&invocation(30)).await.unwrap();
        assert!(console.text().contains("#### Test stderr:\nbad \u{FFFD} byte\n"));
    }

    #[test]
    fn prepare_computes_deadline() {
        let bot = bot_dir();
        let (harness, _console) = harness(&bot, FakeDevice::new(), CannedRunner::exiting(0));

        let prepared = harness.prepare(&invocation(60)).unwrap();
        assert_eq!(prepared.deadline, Duration::from_secs(45));
        assert_eq!(prepared.script, bot.path().join("bot-scripts/smoke.sh"));
    }
}
