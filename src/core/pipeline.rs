//! One pipeline stage, end to end
//!
//! normalize options -> populate stage -> run command -> archive -> finalize.
//! The staging directory is released on every path out of [`PipelineRunner::run`].

use crate::core::archive::{self, EntrySpec};
use crate::core::error::{ArchiveError, PipelineError, StageError, StageResult, ResultExt};
use crate::core::executor::{DryRunExecutor, Executor, InterruptFlag, ShellExecutor, command_line};
use crate::core::options::{PipelineOptions, StagePlan};
use crate::core::stage::StageManager;
use crate::core::vcs::{GIT_DIR, IgnoreRules, SystemGit};
use crate::ui::log;
use crate::ui::progress::MultiProgress;
use crate::ui::prompt::{Confirm, FixedAnswer, TerminalPrompt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Why a stage wrote no archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveSkip {
  /// Continuation without --write/--overwrite
  Disabled,
  /// Nothing left to archive after ignore rules
  NoFiles,
  /// The destination existed and overwriting was declined
  OverwriteDeclined,
  /// Dry run; the command never ran
  DryRun,
}

/// Report of one completed stage
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
  pub command: String,
  pub inputs: Vec<PathBuf>,
  /// Archive written by this stage
  pub archive: Option<PathBuf>,
  pub skip_reason: Option<ArchiveSkip>,
  /// Top-level entries selected for the archive
  pub entries: Vec<String>,
  /// Zip records written
  pub records: usize,
  /// Entries left out because they could not be read
  pub skipped_entries: Vec<String>,
  /// SHA-256 of the written archive, lowercase hex
  pub sha256: Option<String>,
  pub initial_dirty: bool,
  pub final_dirty: bool,
  /// Staging directory left behind with --no-cleanup
  pub kept_stage: Option<PathBuf>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

/// Archive-related part of an outcome
#[derive(Debug, Default)]
struct ArchiveReport {
  archive: Option<PathBuf>,
  skip_reason: Option<ArchiveSkip>,
  entries: Vec<String>,
  records: usize,
  skipped_entries: Vec<String>,
  sha256: Option<String>,
  final_dirty: bool,
}

impl ArchiveReport {
  fn skipped(reason: ArchiveSkip) -> Self {
    Self {
      skip_reason: Some(reason),
      ..Default::default()
    }
  }
}

/// Runs stages for one invocation directory
pub struct PipelineRunner {
  options: PipelineOptions,
  invocation_dir: PathBuf,
  executor: Box<dyn Executor>,
  confirm: Box<dyn Confirm>,
  interrupt: InterruptFlag,
  progress: Option<MultiProgress>,
}

impl PipelineRunner {
  /// Pick the executor and confirmation strategy from `options`
  pub fn new(options: PipelineOptions, invocation_dir: impl Into<PathBuf>) -> Self {
    let interrupt = InterruptFlag::global();
    let executor: Box<dyn Executor> = if options.dry_run {
      Box::new(DryRunExecutor)
    } else {
      // With --json, stdout belongs to the report.
      Box::new(ShellExecutor::new(interrupt.clone(), options.json))
    };
    let confirm: Box<dyn Confirm> = match options.overwrite_answer {
      Some(answer) => Box::new(FixedAnswer(answer)),
      None => Box::new(TerminalPrompt),
    };

    Self {
      options,
      invocation_dir: invocation_dir.into(),
      executor,
      confirm,
      interrupt,
      progress: MultiProgress::for_terminal(),
    }
  }

  /// Replace the confirmation strategy
  pub fn with_confirm(mut self, confirm: impl Confirm + 'static) -> Self {
    self.confirm = Box::new(confirm);
    self
  }

  /// Replace the command executor
  pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
    self.executor = Box::new(executor);
    self
  }

  /// Watch `interrupt` instead of the process-wide signal flag
  ///
  /// Pair with [`Self::with_executor`]; the default executor keeps watching
  /// the flag it was built with.
  pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
    self.interrupt = interrupt;
    self
  }

  /// Run `command` in a fresh stage and archive the result
  pub fn run(&self, command: &[String]) -> StageResult<StageOutcome> {
    if command.is_empty() {
      return Err(StageError::message("No command given"));
    }
    // A signal from an earlier stage in this process must not cancel this one.
    self.interrupt.clear();
    let started_at = Utc::now();
    let plan = self.options.normalize(&self.invocation_dir);
    tracing::debug!(?plan, "normalized stage options");

    for input in &plan.inputs {
      if !input.is_file() {
        return Err(StageError::Archive(ArchiveError::NotFound { path: input.clone() }));
      }
    }

    let mut stage = StageManager::create(self.options.no_cleanup)?;
    log::info(format!("📦 Staging in {}", stage.root().display()));

    let result = self.run_in_stage(&mut stage, command, &plan);
    let initial_dirty = stage.initial_dirty();
    let kept_stage = match (stage.finalize(), &result) {
      (Ok(kept), _) => kept,
      (Err(e), Ok(_)) => return Err(e),
      (Err(e), Err(_)) => {
        tracing::warn!("{}", e);
        None
      }
    };
    if let Some(kept) = &kept_stage {
      log::info(format!("Leaving stage directory for inspection: {}", kept.display()));
    }

    let report = result?;
    Ok(StageOutcome {
      command: command_line(command),
      inputs: plan.inputs,
      archive: report.archive,
      skip_reason: report.skip_reason,
      entries: report.entries,
      records: report.records,
      skipped_entries: report.skipped_entries,
      sha256: report.sha256,
      initial_dirty,
      final_dirty: report.final_dirty,
      kept_stage,
      started_at,
      finished_at: Utc::now(),
    })
  }

  fn run_in_stage(&self, stage: &mut StageManager, command: &[String], plan: &StagePlan) -> StageResult<ArchiveReport> {
    if plan.inputs.is_empty() {
      let repo = SystemGit::open(&self.invocation_dir)?;
      tracing::debug!(repo = %repo.root().display(), "staging live repository");
      stage.populate_from_repository(&repo, self.options.allow_dirty)?;
    } else {
      stage.populate_from_archives(&plan.inputs, self.progress.as_ref())?;
    }
    self.check_interrupt(command)?;

    self.executor.execute(command, stage.root())?;
    stage.mark_executed();
    self.check_interrupt(command)?;

    if self.options.dry_run {
      return Ok(ArchiveReport::skipped(ArchiveSkip::DryRun));
    }
    match &plan.output {
      Some(output) => self.write_archive(stage, output, plan.overwrite),
      None => {
        tracing::debug!("no output archive for this stage");
        Ok(ArchiveReport::skipped(ArchiveSkip::Disabled))
      }
    }
  }

  fn check_interrupt(&self, command: &[String]) -> StageResult<()> {
    if self.interrupt.is_raised() {
      return Err(StageError::Pipeline(PipelineError::Interrupted {
        command: command_line(command),
      }));
    }
    Ok(())
  }

  fn write_archive(&self, stage: &StageManager, output: &Path, overwrite: bool) -> StageResult<ArchiveReport> {
    let root = stage.root();

    // Stages without metadata get a throwaway repository so ignore rules apply.
    let mut scratch: Option<TempDir> = None;
    let git = if stage.has_git_dir() {
      SystemGit::at_root(root)?
    } else {
      let dir = scratch.insert(TempDir::new().context("Failed to create scratch repository")?);
      tracing::debug!(scratch = %dir.path().display(), "using scratch repository");
      SystemGit::with_scratch_repo(root, dir.path())?
    };

    let tracked = git.tracked_dirty_files()?;
    let rules = IgnoreRules::for_root(root, &self.options.exclude_artifacts, &self.options.include_artifacts);
    let untracked = git.untracked_files(&rules)?;

    let final_dirty = !tracked.is_empty();
    if !stage.initial_dirty() && final_dirty {
      log::warn("Repository is not clean after staging");
      git.print_status();
    }

    let mut entries = Vec::with_capacity(untracked.len() + 1);
    if stage.has_git_dir() {
      entries.push(EntrySpec::relative(root, GIT_DIR));
    }
    entries.extend(untracked.iter().map(|path| EntrySpec::relative(root, path)));

    let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    if entries.is_empty() {
      log::warn("No files to archive");
      return Ok(ArchiveReport {
        final_dirty,
        ..ArchiveReport::skipped(ArchiveSkip::NoFiles)
      });
    }

    if output.exists() && !overwrite {
      let question = format!("Overwrite existing {}?", output.display());
      if !self.confirm.confirm(&question, false)? {
        log::info("Skipping archive creation, file already exists.");
        return Ok(ArchiveReport {
          entries: names,
          final_dirty,
          ..ArchiveReport::skipped(ArchiveSkip::OverwriteDeclined)
        });
      }
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let summary = archive::create(output, &entries, self.progress.as_ref())?;
    for failure in &summary.skipped {
      log::warn(failure.to_string());
    }
    let digest = sha256_file(output)?;
    log::info(format!("✅ Archived {} entries to {}", summary.records, output.display()));

    Ok(ArchiveReport {
      archive: Some(output.to_path_buf()),
      skip_reason: None,
      entries: names,
      records: summary.records,
      skipped_entries: summary.skipped.iter().map(ToString::to_string).collect(),
      sha256: Some(digest),
      final_dirty,
    })
  }
}

/// Lowercase hex SHA-256 of a file
fn sha256_file(path: &Path) -> StageResult<String> {
  let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to hash {}", path.display()))?;
  Ok(format!("{:x}", hasher.finalize()))
}
