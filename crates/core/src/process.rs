//! Subprocess execution with merged output capture
//!
//! Every external tool invocation in the orchestrator goes through
//! [`ProcessRunner`]. A non-zero exit code is a normal, reportable result;
//! only the inability to start the process at all is mapped to the
//! [`LAUNCH_FAILED`] sentinel.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Sentinel exit code reported when a process could not be started.
pub const LAUNCH_FAILED: i32 = -1;

/// Exit status and captured output of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    pub output: String,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self {
            exit_code: LAUNCH_FAILED,
            output: message.into(),
        }
    }
}

/// Seam for spawning external build tools, so the layers above can be
/// exercised without real Gradle/Ant installations.
pub trait ProcessRunner {
    /// Run `command` with an explicit working directory, blocking until it
    /// exits. Never fails: launch errors become a [`LAUNCH_FAILED`] result.
    fn run(&self, command: &[String], working_dir: Option<&Path>) -> RunResult;
}

/// [`ProcessRunner`] backed by `std::process`, capturing stderr into the
/// same stream as stdout so diagnostic ordering is preserved.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &[String], working_dir: Option<&Path>) -> RunResult {
        let Some((program, args)) = command.split_first() else {
            return RunResult::launch_failed("empty command line");
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        debug!("running: {} (cwd: {:?})", command.join(" "), working_dir);

        let result = match spawn_and_capture(cmd) {
            Ok(result) => result,
            Err(e) => {
                warn!("could not start {program}: {e}");
                return RunResult::launch_failed(format!("failed to start {program}: {e}"));
            }
        };

        if !result.succeeded() {
            warn!(
                "command failed (exit code {}): {}",
                result.exit_code,
                command.join(" ")
            );
            if self.verbose {
                warn!("output:\n{}", result.output);
            }
        }

        result
    }
}

fn spawn_and_capture(mut cmd: Command) -> std::io::Result<RunResult> {
    // Both standard streams write into one pipe, like the original
    // redirectErrorStream behavior, so interleaving survives the capture.
    let (mut reader, writer) = std::io::pipe()?;
    cmd.stdout(writer.try_clone()?);
    cmd.stderr(writer);

    let mut child = cmd.spawn()?;
    // The Command still owns the write ends; drop it or the read below
    // never sees EOF.
    drop(cmd);

    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let status = child.wait()?;

    Ok(RunResult {
        exit_code: status.code().unwrap_or(LAUNCH_FAILED),
        output: String::from_utf8_lossy(&buf).into_owned(),
    })
}
