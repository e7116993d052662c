//! Error types for relstage with contextual messages and exit codes
//!
//! Every fatal error carries enough context to print a useful message, and most
//! categories add a help line pointing at the flag or fix that resolves them.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for relstage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (dirty repo, config, missing archives)
  User = 1,
  /// System error (git, I/O, corrupt archive)
  System = 2,
  /// The staged command failed or was interrupted
  Command = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for relstage
#[derive(Debug)]
pub enum StageError {
  /// Configuration errors
  Config(ConfigError),

  /// Git operation errors
  Git(GitError),

  /// Archive read/write errors
  Archive(ArchiveError),

  /// Pipeline stage failures (dirty repo, command exit, interrupts)
  Pipeline(PipelineError),

  /// I/O errors
  Io(io::Error),

  /// I/O error with a description of the failed operation
  IoContext { context: String, source: io::Error },

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl StageError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    StageError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Add context to an existing error
  ///
  /// I/O errors keep their source and stay system errors.
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      StageError::Message { message, context, help } => StageError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      StageError::Io(source) => StageError::IoContext { context: ctx_str, source },
      StageError::IoContext { context, source } => StageError::IoContext {
        context: format!("{}: {}", ctx_str, context),
        source,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      StageError::Config(_) => ExitCode::User,
      StageError::Git(_) => ExitCode::System,
      StageError::Archive(ArchiveError::NotFound { .. }) => ExitCode::User,
      StageError::Archive(_) => ExitCode::System,
      StageError::Pipeline(PipelineError::DirtyRepository { .. }) => ExitCode::User,
      StageError::Pipeline(_) => ExitCode::Command,
      StageError::Io(_) | StageError::IoContext { .. } => ExitCode::System,
      StageError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      StageError::Config(e) => e.help_message(),
      StageError::Git(e) => e.help_message(),
      StageError::Archive(e) => e.help_message(),
      StageError::Pipeline(e) => e.help_message(),
      StageError::Message { help, .. } => help.clone(),
      StageError::Io(_) | StageError::IoContext { .. } => None,
    }
  }
}

impl fmt::Display for StageError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StageError::Config(e) => write!(f, "{}", e),
      StageError::Git(e) => write!(f, "{}", e),
      StageError::Archive(e) => write!(f, "{}", e),
      StageError::Pipeline(e) => write!(f, "{}", e),
      StageError::Io(e) => write!(f, "I/O error: {}", e),
      StageError::IoContext { context, source } => write!(f, "{}: {}", context, source),
      StageError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for StageError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      StageError::Io(e) | StageError::IoContext { source: e, .. } => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for StageError {
  fn from(err: io::Error) -> Self {
    StageError::Io(err)
  }
}

impl From<String> for StageError {
  fn from(msg: String) -> Self {
    StageError::message(msg)
  }
}

impl From<&str> for StageError {
  fn from(msg: &str) -> Self {
    StageError::message(msg)
  }
}

impl From<ConfigError> for StageError {
  fn from(err: ConfigError) -> Self {
    StageError::Config(err)
  }
}

impl From<GitError> for StageError {
  fn from(err: GitError) -> Self {
    StageError::Git(err)
  }
}

impl From<ArchiveError> for StageError {
  fn from(err: ArchiveError) -> Self {
    StageError::Archive(err)
  }
}

impl From<PipelineError> for StageError {
  fn from(err: PipelineError) -> Self {
    StageError::Pipeline(err)
  }
}

impl From<zip::result::ZipError> for StageError {
  fn from(err: zip::result::ZipError) -> Self {
    match err {
      zip::result::ZipError::Io(e) => StageError::Io(e),
      other => StageError::message(format!("Zip error: {}", other)),
    }
  }
}

impl From<walkdir::Error> for StageError {
  fn from(err: walkdir::Error) -> Self {
    StageError::message(format!("Directory walk error: {}", err))
  }
}

impl From<tempfile::PersistError> for StageError {
  fn from(err: tempfile::PersistError) -> Self {
    StageError::Io(err.error)
  }
}

impl From<toml_edit::de::Error> for StageError {
  fn from(err: toml_edit::de::Error) -> Self {
    StageError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for StageError {
  fn from(err: serde_json::Error) -> Self {
    StageError::message(format!("JSON error: {}", err))
  }
}

impl From<std::path::StripPrefixError> for StageError {
  fn from(err: std::path::StripPrefixError) -> Self {
    StageError::message(format!("Path strip prefix error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// relstage.toml exists but could not be parsed
  Invalid { path: PathBuf, reason: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::Invalid { .. } => {
        Some("Check the [run] table against the documented keys, or remove the file to use defaults.".to_string())
      }
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::Invalid { path, reason } => {
        write!(f, "Invalid configuration in {}: {}", path.display(), reason)
      }
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// Path is not inside a git repository
  NotARepository { path: PathBuf },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::NotARepository { path } => Some(format!(
        "Run relstage from inside a git checkout, or pass --initial-archive. Looked in: {}",
        path.display()
      )),
      GitError::CommandFailed { .. } => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr.trim_end())
      }
      GitError::NotARepository { path } => {
        write!(f, "Not a git repository: {}", path.display())
      }
    }
  }
}

/// Archive errors
#[derive(Debug)]
pub enum ArchiveError {
  /// Input archive does not exist
  NotFound { path: PathBuf },

  /// Archive could not be parsed or contains unsafe entries
  Corrupt { path: PathBuf, reason: String },

  /// A single entry could not be added to an output archive
  ///
  /// Never fatal on its own; collected into the write summary.
  EntryFailed { entry: String, reason: String },
}

impl ArchiveError {
  fn help_message(&self) -> Option<String> {
    match self {
      ArchiveError::NotFound { .. } => {
        Some("Run the previous stage with --write, or pass the archive path with --initial-archive.".to_string())
      }
      ArchiveError::Corrupt { .. } => Some("Recreate the archive by re-running the stage that produced it.".to_string()),
      ArchiveError::EntryFailed { .. } => None,
    }
  }
}

impl fmt::Display for ArchiveError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArchiveError::NotFound { path } => write!(f, "Archive does not exist: {}", path.display()),
      ArchiveError::Corrupt { path, reason } => {
        write!(f, "Corrupt archive {}: {}", path.display(), reason)
      }
      ArchiveError::EntryFailed { entry, reason } => {
        write!(f, "Failed to add {} to archive: {}", entry, reason)
      }
    }
  }
}

/// Stage failures
#[derive(Debug)]
pub enum PipelineError {
  /// Tracked files have uncommitted changes and --allow-dirty was not given
  DirtyRepository { files: Vec<String> },

  /// The staged command exited unsuccessfully
  CommandFailed { command: String, code: Option<i32> },

  /// The staged command was interrupted (Ctrl-C)
  Interrupted { command: String },
}

impl PipelineError {
  fn help_message(&self) -> Option<String> {
    match self {
      PipelineError::DirtyRepository { .. } => {
        Some("Commit or stash your changes, or call with `--allow-dirty` to force the run.".to_string())
      }
      PipelineError::CommandFailed { .. } => {
        Some("Re-run with --no-cleanup to inspect the staging directory.".to_string())
      }
      PipelineError::Interrupted { .. } => None,
    }
  }
}

impl fmt::Display for PipelineError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PipelineError::DirtyRepository { files } => {
        write!(f, "Repository is not clean ({} modified tracked file(s))", files.len())?;
        for file in files.iter().take(10) {
          write!(f, "\n   {}", file)?;
        }
        if files.len() > 10 {
          write!(f, "\n   ... and {} more", files.len() - 10)?;
        }
        Ok(())
      }
      PipelineError::CommandFailed { command, code } => match code {
        Some(code) => write!(f, "Command failed with exit code {}: {}", code, command),
        None => write!(f, "Command terminated by signal: {}", command),
      },
      PipelineError::Interrupted { command } => write!(f, "Interrupted while running: {}", command),
    }
  }
}

/// Result type alias for relstage
pub type StageResult<T> = Result<T, StageError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> StageResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> StageResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<StageError>,
{
  fn context(self, ctx: impl Into<String>) -> StageResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> StageResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &StageError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
