//! Integration tests for chaining stages through archives

use crate::helpers::{TestRepo, archive_entries, archive_text, relstage, run_relstage, write_plain_archive};
use anyhow::Result;

#[test]
fn test_write_then_continue_chains_stages() -> Result<()> {
  let repo = TestRepo::new()?;

  run_relstage(&repo.path, &["run", "--write", "echo one > stage1.txt"])?;
  run_relstage(
    &repo.path,
    &["run", "--continue", "--write", "test -f stage1.txt && echo two > stage2.txt"],
  )?;

  let entries = archive_entries(&repo.archive())?;
  assert!(entries.contains(&"stage1.txt".to_string()));
  assert!(entries.contains(&"stage2.txt".to_string()));
  assert!(entries.iter().any(|e| e.starts_with(".git/")));

  Ok(())
}

#[test]
fn test_continue_sees_committed_tree() -> Result<()> {
  let repo = TestRepo::new()?;

  run_relstage(&repo.path, &["run", "--write", "true"])?;
  run_relstage(
    &repo.path,
    &["run", "--continue", "--write", "cp README.md readme-copy.md"],
  )?;
  assert_eq!(archive_text(&repo.archive(), "readme-copy.md")?, "# demo\n");

  Ok(())
}

#[test]
fn test_continue_without_write_leaves_archive_alone() -> Result<()> {
  let repo = TestRepo::new()?;

  run_relstage(&repo.path, &["run", "echo one > stage1.txt"])?;
  let before = std::fs::read(repo.archive())?;

  run_relstage(&repo.path, &["run", "--continue", "echo two > stage2.txt"])?;
  assert_eq!(std::fs::read(repo.archive())?, before);

  Ok(())
}

#[test]
fn test_continue_without_previous_archive_fails() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = relstage(&repo.path, &["run", "--continue", "true"])?;
  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("rel-archive.zip"), "stderr: {}", stderr);

  Ok(())
}

#[test]
fn test_later_archive_wins_on_conflict() -> Result<()> {
  let repo = TestRepo::new()?;
  let first = repo.path.join("first.zip");
  let second = repo.path.join("second.zip");
  write_plain_archive(&first, &[("shared.txt", "first"), ("one.txt", "1")])?;
  write_plain_archive(&second, &[("shared.txt", "second"), ("two.txt", "2")])?;

  run_relstage(
    &repo.path,
    &[
      "run",
      "-i",
      "first.zip",
      "-i",
      "second.zip",
      "-o",
      "merged.zip",
      "true",
    ],
  )?;

  let merged = repo.path.join("merged.zip");
  let entries = archive_entries(&merged)?;
  assert!(entries.contains(&"one.txt".to_string()));
  assert!(entries.contains(&"two.txt".to_string()));
  assert_eq!(archive_text(&merged, "shared.txt")?, "second");

  Ok(())
}

#[test]
fn test_missing_initial_archive_fails() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = relstage(&repo.path, &["run", "-i", "absent.zip", "true"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(!repo.file_exists("rel-archive.zip"));

  Ok(())
}
