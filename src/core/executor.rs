//! Command execution strategies for a stage
//!
//! The pipeline picks one executor per invocation: [`ShellExecutor`] runs the
//! command line through the platform shell inside the staging directory,
//! [`DryRunExecutor`] only reports what would run.

use crate::core::error::{PipelineError, StageError, StageResult, ResultExt};
use crate::ui::log;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

static INTERRUPTED: LazyLock<InterruptFlag> = LazyLock::new(InterruptFlag::default);

/// Shared record of a Ctrl-C or termination request
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
  /// The flag raised by the process-wide signal handler
  pub fn global() -> Self {
    INTERRUPTED.clone()
  }

  pub fn raise(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn clear(&self) {
    self.0.store(false, Ordering::SeqCst);
  }

  pub fn is_raised(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Install the process-wide handler for Ctrl-C and SIGTERM
///
/// The child shares our terminal and receives Ctrl-C itself; the handler only
/// records the signal so the pipeline can unwind through finalize instead of
/// the process dying with the staging directory still on disk.
pub fn install_interrupt_handler() -> StageResult<()> {
  let flag = InterruptFlag::global();
  ctrlc::set_handler(move || flag.raise())
    .map_err(|e| StageError::message(format!("Failed to install signal handler: {}", e)))
}

/// Runs a stage command line in a working directory
pub trait Executor {
  fn execute(&self, command: &[String], cwd: &Path) -> StageResult<()>;
}

/// Runs the command through `sh -c` (`cmd /C` on Windows) with inherited stdio
pub struct ShellExecutor {
  interrupt: InterruptFlag,
  /// Send the child's stdout to our stderr (stdout carries a report)
  stdout_to_stderr: bool,
}

impl ShellExecutor {
  pub fn new(interrupt: InterruptFlag, stdout_to_stderr: bool) -> Self {
    Self {
      interrupt,
      stdout_to_stderr,
    }
  }
}

impl Executor for ShellExecutor {
  fn execute(&self, command: &[String], cwd: &Path) -> StageResult<()> {
    let line = command_line(command);
    tracing::debug!(cwd = %cwd.display(), "running command: {}", line);

    let stdout = if self.stdout_to_stderr {
      Stdio::from(io::stderr())
    } else {
      Stdio::inherit()
    };
    let status = shell(&line)
      .current_dir(cwd)
      .stdin(Stdio::inherit())
      .stdout(stdout)
      .stderr(Stdio::inherit())
      .status()
      .with_context(|| format!("Failed to start command: {}", line))?;

    if self.interrupt.is_raised() {
      return Err(StageError::Pipeline(PipelineError::Interrupted { command: line }));
    }
    if !status.success() {
      return Err(StageError::Pipeline(PipelineError::CommandFailed {
        command: line,
        code: status.code(),
      }));
    }
    Ok(())
  }
}

/// Reports the command without running it
pub struct DryRunExecutor;

impl Executor for DryRunExecutor {
  fn execute(&self, command: &[String], cwd: &Path) -> StageResult<()> {
    log::info(format!("🔍 DRY RUN: would run `{}` in {}", command_line(command), cwd.display()));
    Ok(())
  }
}

/// Join command tokens into one shell line
///
/// Tokens are passed through verbatim so redirections and pipes typed as
/// separate arguments keep working (`relstage run echo hi '>' out.txt`).
pub fn command_line(command: &[String]) -> String {
  command.join(" ")
}

#[cfg(not(windows))]
fn shell(line: &str) -> Command {
  let mut cmd = Command::new("sh");
  cmd.arg("-c").arg(line);
  cmd
}

#[cfg(windows)]
fn shell(line: &str) -> Command {
  let mut cmd = Command::new("cmd");
  cmd.arg("/C").arg(line);
  cmd
}
