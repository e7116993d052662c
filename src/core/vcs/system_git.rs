//! System git backend for staging snapshots
//!
//! Every query shells out to `git -C <dir>` with an isolated environment, so the
//! same process can inspect the live repository and any number of staged copies
//! without touching its own working directory.

use super::{FileKind, FileSet, GIT_DIR, IgnoreRules};
use crate::core::error::{GitError, StageError, StageResult, ResultExt};
use crate::utils::path_to_git_format;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Git backend using system git (zero crate dependencies)
pub struct SystemGit {
  /// Working tree root
  pub(crate) work_tree: PathBuf,

  /// Explicit git dir, for trees that carry no `.git` of their own
  pub(crate) git_dir: Option<PathBuf>,
}

impl SystemGit {
  /// Open the repository enclosing `path`
  ///
  /// Resolves the top-level directory with one `rev-parse` call.
  pub fn open(path: &Path) -> StageResult<Self> {
    let output = isolated_command()
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not a git repository") {
        return Err(StageError::Git(GitError::NotARepository {
          path: path.to_path_buf(),
        }));
      }
      return Err(StageError::Git(GitError::CommandFailed {
        command: "git rev-parse --show-toplevel".to_string(),
        stderr: stderr.to_string(),
      }));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Self {
      work_tree: PathBuf::from(stdout.trim()),
      git_dir: None,
    })
  }

  /// Use `root` as a working tree with its own `.git`
  ///
  /// Unlike [`SystemGit::open`] this never walks up into a parent repository,
  /// which matters for staging directories nested under a checkout.
  pub fn at_root(root: &Path) -> StageResult<Self> {
    if !root.join(GIT_DIR).exists() {
      return Err(StageError::Git(GitError::NotARepository {
        path: root.to_path_buf(),
      }));
    }
    Ok(Self {
      work_tree: root.to_path_buf(),
      git_dir: None,
    })
  }

  /// Treat `root` as a working tree backed by an empty scratch repository
  ///
  /// Every file under `root` then reads as untracked, while ignore rules still
  /// apply. Used for stages populated from archives without metadata.
  pub fn with_scratch_repo(root: &Path, scratch: &Path) -> StageResult<Self> {
    let output = isolated_command()
      .args(["init", "--quiet"])
      .arg(scratch)
      .output()
      .context("Failed to execute git init")?;

    if !output.status.success() {
      return Err(StageError::Git(GitError::CommandFailed {
        command: "git init".to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      }));
    }

    Ok(Self {
      work_tree: root.to_path_buf(),
      git_dir: Some(scratch.join(GIT_DIR)),
    })
  }

  /// Repository top-level directory
  pub fn root(&self) -> &Path {
    &self.work_tree
  }

  /// Tracked files with uncommitted modifications or additions
  pub fn tracked_dirty_files(&self) -> StageResult<FileSet> {
    let stdout = self.run(&["status", "--porcelain=v1", "-z", "--untracked-files=no"])?;
    Ok(parse_status_z(&stdout))
  }

  /// Untracked files after ignore rules, directories reported once
  pub fn untracked_files(&self, rules: &IgnoreRules) -> StageResult<FileSet> {
    let mut args: Vec<String> = vec![
      "ls-files".into(),
      "--others".into(),
      "--directory".into(),
      "-z".into(),
    ];
    for file in &rules.ignore_files {
      args.push(format!("--exclude-from={}", path_to_git_format(file)));
    }
    for pattern in rules.exclude_patterns() {
      args.push(format!("--exclude={}", pattern));
    }

    let stdout = self.run(&args)?;
    let mut files = FileSet::from_paths(FileKind::Untracked, parse_nul_list(&stdout));

    // Git cannot re-include a path whose parent directory is excluded, so
    // include matches are listed separately and merged in.
    if !rules.include.is_empty() {
      let mut args: Vec<String> = vec![
        "ls-files".into(),
        "--others".into(),
        "--ignored".into(),
        "--directory".into(),
        "-z".into(),
      ];
      for pattern in &rules.include {
        args.push(format!("--exclude={}", pattern));
      }
      let stdout = self.run(&args)?;
      for path in parse_nul_list(&stdout) {
        files.insert(path);
      }
      files.collapse_nested();
    }

    tracing::debug!(
      root = %self.work_tree.display(),
      kind = ?files.kind(),
      count = files.len(),
      "listed files"
    );
    Ok(files)
  }

  /// Reset the working tree to the last commit
  pub fn reset_hard(&self) -> StageResult<()> {
    self.run(&["reset", "--hard", "--quiet"])?;
    Ok(())
  }

  /// Print `git status` to stderr
  ///
  /// Purely informational; a failing status is ignored. Stdout stays free for
  /// the JSON report.
  pub fn print_status(&self) {
    let status = self
      .git_cmd()
      .arg("status")
      .stdin(Stdio::null())
      .stdout(Stdio::from(io::stderr()))
      .stderr(Stdio::inherit())
      .status();
    if let Err(e) = status {
      tracing::debug!(error = %e, "git status could not be run");
    }
  }

  /// Run a git subcommand and return stdout, mapping failure to `CommandFailed`
  fn run<S: AsRef<str>>(&self, args: &[S]) -> StageResult<Vec<u8>> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    let command = format!("git {}", args.join(" "));
    tracing::debug!(cwd = %self.work_tree.display(), "{}", command);

    let output = self
      .git_cmd()
      .args(&args)
      .output()
      .with_context(|| format!("Failed to execute {}", command))?;

    if !output.status.success() {
      return Err(StageError::Git(GitError::CommandFailed {
        command,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      }));
    }

    Ok(output.stdout)
  }

  /// Create a safe git command for this work tree
  ///
  /// - Sets working directory to the work tree
  /// - Runs in the isolated environment of [`isolated_command`]
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = isolated_command();

    cmd.arg("-C").arg(&self.work_tree);
    if let Some(git_dir) = &self.git_dir {
      cmd.arg("--git-dir").arg(git_dir);
      cmd.arg("--work-tree").arg(&self.work_tree);
    }

    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false"); // Don't escape non-ASCII

    cmd
  }
}

/// `git` with an isolated environment
///
/// Clears the environment (no inherited `GIT_DIR` or `GIT_WORK_TREE`), keeps
/// only PATH and HOME, and forces the C locale so error text can be matched.
fn isolated_command() -> Command {
  let mut cmd = Command::new("git");
  cmd.env_clear();
  if let Ok(path) = std::env::var("PATH") {
    cmd.env("PATH", path);
  }
  if let Ok(home) = std::env::var("HOME") {
    cmd.env("HOME", home);
  }
  cmd.env("LC_ALL", "C");
  cmd
}

/// Parse `git status --porcelain=v1 -z` into the tracked-dirty set
///
/// Records are `XY <path>`; renames and copies are followed by an extra record
/// holding the origin path, which is skipped. Untracked (`??`) and ignored
/// (`!!`) records never enter the set.
fn parse_status_z(data: &[u8]) -> FileSet {
  let text = String::from_utf8_lossy(data);
  let mut records = text.split('\0').filter(|r| !r.is_empty());
  let mut files = FileSet::new(FileKind::TrackedDirty);

  while let Some(record) = records.next() {
    if record.len() < 4 {
      continue;
    }
    let (xy, path) = record.split_at(3);
    let xy = &xy[..2];
    if xy.contains('R') || xy.contains('C') {
      records.next();
    }
    if xy == "??" || xy == "!!" {
      continue;
    }
    files.insert(path);
  }

  files
}

/// Split NUL-terminated git output into path strings
fn parse_nul_list(data: &[u8]) -> Vec<String> {
  String::from_utf8_lossy(data)
    .split('\0')
    .filter(|s| !s.is_empty())
    .map(|s| s.to_string())
    .collect()
}
