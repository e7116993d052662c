//! Integration tests for `relstage run`

use crate::helpers::{TestRepo, archive_entries, archive_text, relstage, run_relstage};
use anyhow::Result;

#[test]
fn test_clean_stage_archives_command_output() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file("scratch.tmp", "left in the working tree")?;

  let output = run_relstage(&repo.path, &["run", "echo hi > out.txt"])?;
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("Staging in"), "missing staging line: {}", stderr);

  let entries = archive_entries(&repo.archive())?;
  assert!(entries.contains(&"out.txt".to_string()));
  assert!(entries.iter().any(|e| e.starts_with(".git/")));
  assert!(!entries.contains(&"README.md".to_string()), "tracked files are not archived");
  assert!(!entries.contains(&"scratch.tmp".to_string()));
  assert_eq!(archive_text(&repo.archive(), "out.txt")?, "hi\n");

  Ok(())
}

#[test]
fn test_command_tokens_are_joined_for_the_shell() -> Result<()> {
  let repo = TestRepo::new()?;

  run_relstage(&repo.path, &["run", "sh", "src/main.sh", ">", "build.txt"])?;
  assert_eq!(archive_text(&repo.archive(), "build.txt")?, "built\n");

  Ok(())
}

#[test]
fn test_dirty_repository_is_refused() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file("README.md", "# changed\n")?;

  let output = relstage(&repo.path, &["run", "echo hi > out.txt"])?;
  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("README.md"), "dirty file not listed: {}", stderr);
  assert!(stderr.contains("--allow-dirty"), "missing help: {}", stderr);
  assert!(!repo.file_exists("rel-archive.zip"));

  Ok(())
}

#[test]
fn test_allow_dirty_stages_uncommitted_changes() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file("README.md", "# changed\n")?;

  run_relstage(&repo.path, &["run", "--allow-dirty", "cp README.md copy.md"])?;
  assert_eq!(archive_text(&repo.archive(), "copy.md")?, "# changed\n");

  Ok(())
}

#[test]
fn test_failing_command_exits_with_command_code() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = relstage(&repo.path, &["run", "exit 5"])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(!repo.file_exists("rel-archive.zip"));

  Ok(())
}

#[test]
fn test_include_artifact_overrides_ignore_rules() -> Result<()> {
  let repo = TestRepo::new()?;
  let command = "mkdir -p target && echo bin > target/app && echo log > build.log";

  run_relstage(
    &repo.path,
    &[
      "run",
      "--exclude-artifact",
      "*.log",
      "--include-artifact",
      "target",
      "--include-artifact",
      "*.log",
      command,
    ],
  )?;

  let entries = archive_entries(&repo.archive())?;
  assert!(entries.contains(&"target/app".to_string()), "entries: {:?}", entries);
  assert!(entries.contains(&"build.log".to_string()), "entries: {:?}", entries);

  Ok(())
}

#[test]
fn test_relignore_excludes_artifacts() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file(".relignore", "*.o\n")?;
  crate::helpers::git(&repo.path, &["add", ".relignore"])?;
  crate::helpers::git(&repo.path, &["commit", "-m", "Add relignore"])?;

  run_relstage(&repo.path, &["run", "echo obj > main.o && echo bin > app"])?;
  let entries = archive_entries(&repo.archive())?;
  assert!(entries.contains(&"app".to_string()));
  assert!(!entries.contains(&"main.o".to_string()));

  Ok(())
}

#[test]
fn test_existing_archive_is_kept_without_terminal() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file("rel-archive.zip", "previous")?;

  let output = run_relstage(&repo.path, &["run", "echo hi > out.txt"])?;
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("Skipping archive creation"), "stderr: {}", stderr);
  assert_eq!(std::fs::read_to_string(repo.archive())?, "previous");

  Ok(())
}

#[test]
fn test_yes_overwrites_existing_archive() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file("rel-archive.zip", "previous")?;

  run_relstage(&repo.path, &["run", "--yes", "echo hi > out.txt"])?;
  assert!(archive_entries(&repo.archive())?.contains(&"out.txt".to_string()));

  Ok(())
}

#[test]
fn test_output_archive_path_is_relative_to_invocation() -> Result<()> {
  let repo = TestRepo::new()?;

  run_relstage(&repo.path, &["run", "-o", "dist/stage1.zip", "echo hi > out.txt"])?;
  assert!(repo.file_exists("dist/stage1.zip"));
  assert!(!repo.file_exists("rel-archive.zip"));

  Ok(())
}

#[test]
fn test_no_cleanup_reports_stage_directory() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = run_relstage(&repo.path, &["run", "--no-cleanup", "--json", "echo hi > out.txt"])?;
  let outcome: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  let kept = outcome["kept_stage"].as_str().expect("kept stage path");
  let kept = std::path::Path::new(kept);
  assert!(kept.join("out.txt").exists());
  std::fs::remove_dir_all(kept)?;

  Ok(())
}

#[test]
fn test_json_outcome() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = run_relstage(&repo.path, &["run", "--json", "echo hi > out.txt"])?;
  let outcome: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(outcome["command"], "echo hi > out.txt");
  assert_eq!(outcome["initial_dirty"], false);
  assert_eq!(outcome["sha256"].as_str().map(str::len), Some(64));
  assert!(outcome["kept_stage"].is_null());
  assert!(outcome["started_at"].is_string());

  Ok(())
}

#[test]
fn test_dry_run_writes_nothing() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = run_relstage(&repo.path, &["run", "--dry-run", "echo hi > out.txt"])?;
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("DRY RUN"), "stderr: {}", stderr);
  assert!(!repo.file_exists("rel-archive.zip"));

  Ok(())
}

#[test]
fn test_config_file_supplies_defaults() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file("relstage.toml", "[run]\nexclude_artifacts = [\"*.log\"]\n")?;
  crate::helpers::git(&repo.path, &["add", "relstage.toml"])?;
  crate::helpers::git(&repo.path, &["commit", "-m", "Add relstage config"])?;

  run_relstage(&repo.path, &["run", "echo log > build.log && echo bin > app"])?;
  let entries = archive_entries(&repo.archive())?;
  assert!(entries.contains(&"app".to_string()));
  assert!(!entries.contains(&"build.log".to_string()));

  Ok(())
}

#[test]
fn test_invalid_config_is_a_user_error() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_file(".relstage.toml", "[run]\nallow_dirt = true\n")?;

  let output = relstage(&repo.path, &["run", "true"])?;
  assert_eq!(output.status.code(), Some(1));

  Ok(())
}

#[test]
fn test_outside_repository_fails() -> Result<()> {
  let dir = tempfile::TempDir::new()?;

  let output = relstage(dir.path(), &["run", "true"])?;
  assert_eq!(output.status.code(), Some(2));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("Not a git repository"), "stderr: {}", stderr);

  Ok(())
}

#[test]
fn test_modified_tracked_file_warns_and_still_archives() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = run_relstage(&repo.path, &["run", "--json", "echo changed > README.md"])?;
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(
    stderr.contains("Repository is not clean after staging"),
    "missing warning: {}",
    stderr
  );
  assert!(stderr.contains("README.md"), "status not shown: {}", stderr);

  let outcome: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(outcome["initial_dirty"], false);
  assert_eq!(outcome["final_dirty"], true);
  assert!(archive_entries(&repo.archive())?.iter().any(|e| e.starts_with(".git/")));

  Ok(())
}

#[test]
fn test_json_stdout_is_only_the_report() -> Result<()> {
  let repo = TestRepo::new()?;

  let output = run_relstage(
    &repo.path,
    &["run", "--json", "echo changed > README.md && echo noise from the command"],
  )?;
  let outcome: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(outcome["final_dirty"], true);

  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("noise from the command"), "stderr: {}", stderr);

  Ok(())
}

#[cfg(unix)]
#[test]
fn test_sigterm_releases_stage_and_writes_no_archive() -> Result<()> {
  use std::io::{BufRead, BufReader, Read};
  use std::process::{Command, Stdio};

  let repo = TestRepo::new()?;
  let tmp = tempfile::TempDir::new()?;

  let mut child = Command::new(env!("CARGO_BIN_EXE_relstage"))
    .current_dir(&repo.path)
    .args(["run", "sleep 2"])
    .env_remove("RELSTAGE_LOG")
    .env("TMPDIR", tmp.path())
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::piped())
    .spawn()?;

  // The handler is installed before staging starts.
  let mut stderr = BufReader::new(child.stderr.take().expect("piped stderr"));
  let mut seen = String::new();
  loop {
    let mut line = String::new();
    if stderr.read_line(&mut line)? == 0 {
      anyhow::bail!("relstage exited before staging: {}", seen);
    }
    seen.push_str(&line);
    if line.contains("Staging in") {
      break;
    }
  }

  let status = Command::new("kill")
    .args(["-TERM", &child.id().to_string()])
    .status()?;
  assert!(status.success());

  stderr.read_to_string(&mut seen)?;
  let status = child.wait()?;
  assert_eq!(status.code(), Some(3), "stderr: {}", seen);
  assert!(seen.contains("Interrupted"), "stderr: {}", seen);
  assert!(!repo.file_exists("rel-archive.zip"));

  let leftovers: Vec<_> = std::fs::read_dir(tmp.path())?
    .filter_map(|e| e.ok())
    .filter(|e| e.file_name().to_string_lossy().starts_with("relstage"))
    .collect();
  assert!(leftovers.is_empty(), "stage left behind: {:?}", leftovers);

  Ok(())
}
