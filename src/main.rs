//! Bot Harness CLI
//!
//! Entry point for the Swarming bot: runs one device test and exits with
//! 0 (pass), 124 (timeout), the test's own code (fail) or 1 (harness error).

use std::path::PathBuf;

use clap::Parser;

use bot_harness::runner::ProcessRunner;
use bot_harness::{
    shutdown_signal, AdbDevice, CleanupPolicy, Error, Harness, HarnessConfig, Invocation, Result,
    Validate,
};

#[derive(Parser)]
#[command(name = "bot-harness")]
#[command(about = "Swarming task harness for device tests", version)]
struct Cli {
    /// Timeout (duration limit for this test), in seconds
    timeout: u64,

    /// Path to test directory, e.g. tests/foobar
    test_dir: PathBuf,

    /// Path to output directory
    out_dir: PathBuf,

    /// Path to a harness config file (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Device-control program to use instead of `adb`
    #[arg(long)]
    adb: Option<String>,

    /// Serial of the device to target
    #[arg(long, short = 's')]
    serial: Option<String>,

    /// Handling of device failures after the test (best-effort, fail-fast)
    #[arg(long)]
    cleanup_policy: Option<CleanupPolicy>,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries the operator report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Dropping the run on a signal kills a running test's process group
    let result = tokio::select! {
        result = run(cli) => result,
        name = shutdown_signal() => {
            tracing::warn!(signal = name, "harness interrupted, aborting run");
            Err(Error::Interrupted(name))
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            println!("Error: {}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(adb) = cli.adb {
        config.device.program = adb;
    }
    if let Some(serial) = cli.serial {
        config.device.serial = Some(serial);
    }
    if let Some(policy) = cli.cleanup_policy {
        config.cleanup_policy = policy;
    }

    for warning in config.validate().into_result()? {
        tracing::warn!(warning = %warning, "configuration warning");
    }

    let base_dir = std::env::current_dir()?;
    let device = AdbDevice::new(config.device.clone());
    let harness = Harness::new(device, ProcessRunner::new(), base_dir).with_config(config);

    let invocation = Invocation::new(cli.timeout, cli.test_dir, cli.out_dir);
    let report = harness.run(&invocation).await?;

    Ok(report.exit_code())
}
