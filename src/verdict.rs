//! Test verdicts and their exit codes.

use std::fmt;

/// Exit code reported when the test deadline fired, as GNU `timeout` does.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Final status of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The test exited with 0.
    Pass,
    /// The test exited with the given non-zero code.
    Fail(i32),
    /// The test was killed at its deadline.
    ///
    /// The harness exits with [`TIMEOUT_EXIT_CODE`] only after sleeping out
    /// the cleanup reserve. The fleet supervisor enforces the same overall
    /// timeout, so it then records its own timeout for the task and a harness
    /// timeout is never mistaken for a crash. Callers that read the exit code
    /// directly can rely on `124` alone.
    Timeout,
}

impl Verdict {
    /// Derives the verdict from a recorded test exit code.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Verdict::Pass,
            TIMEOUT_EXIT_CODE => Verdict::Timeout,
            other => Verdict::Fail(other),
        }
    }

    /// Exit code the harness returns for this verdict.
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail(code) => *code,
            Verdict::Timeout => TIMEOUT_EXIT_CODE,
        }
    }

    /// Status line printed in the report.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail(_) => "FAIL",
            Verdict::Timeout => "TIMEOUT",
        }
    }

    /// Returns true for a passing test.
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
