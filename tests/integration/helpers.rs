//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Default archive name written next to the invocation directory
pub const DEFAULT_ARCHIVE: &str = "rel-archive.zip";

/// A committed git repository to stage from
pub struct TestRepo {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestRepo {
  /// Create a repository with a README, a small source tree and a .gitignore
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;

    std::fs::create_dir_all(path.join("src"))?;
    std::fs::write(path.join("README.md"), "# demo\n")?;
    std::fs::write(path.join("src/main.sh"), "echo built\n")?;
    std::fs::write(path.join(".gitignore"), "target/\n*.tmp\n")?;

    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "Initial commit"])?;

    Ok(Self { _root: root, path })
  }

  /// Write a file relative to the repository root
  pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
    let full = self.path.join(path);
    if let Some(parent) = full.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(full, content)?;
    Ok(())
  }

  /// Path of the default output archive
  pub fn archive(&self) -> PathBuf {
    self.path.join(DEFAULT_ARCHIVE)
  }

  /// Check if a file exists
  pub fn file_exists(&self, path: &str) -> bool {
    self.path.join(path).exists()
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run relstage and return its output, successful or not
///
/// Stdin is closed, so confirmation prompts take their default answer.
pub fn relstage(cwd: &Path, args: &[&str]) -> Result<Output> {
  Command::new(env!("CARGO_BIN_EXE_relstage"))
    .current_dir(cwd)
    .args(args)
    .env_remove("RELSTAGE_LOG")
    .stdin(Stdio::null())
    .output()
    .context("Failed to run relstage")
}

/// Run relstage and fail unless it succeeds
pub fn run_relstage(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = relstage(cwd, args)?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "relstage command failed: relstage {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// Entry names of a zip archive, in archive order
pub fn archive_entries(path: &Path) -> Result<Vec<String>> {
  let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
  let archive = zip::ZipArchive::new(file)?;
  Ok(archive.file_names().map(String::from).collect())
}

/// Read one entry of a zip archive as text
pub fn archive_text(path: &Path, name: &str) -> Result<String> {
  use std::io::Read;

  let file = std::fs::File::open(path)?;
  let mut archive = zip::ZipArchive::new(file)?;
  let mut entry = archive.by_name(name)?;
  let mut text = String::new();
  entry.read_to_string(&mut text)?;
  Ok(text)
}

/// Build a zip from (name, content) pairs, without any repository metadata
pub fn write_plain_archive(path: &Path, files: &[(&str, &str)]) -> Result<()> {
  use std::io::Write;

  let mut zip = zip::ZipWriter::new(std::fs::File::create(path)?);
  for (name, content) in files {
    zip.start_file(*name, zip::write::SimpleFileOptions::default())?;
    zip.write_all(content.as_bytes())?;
  }
  zip.finish()?;
  Ok(())
}
