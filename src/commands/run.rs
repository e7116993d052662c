use clap::Args;
use std::env;
use std::path::PathBuf;

use crate::core::config::RelstageConfig;
use crate::core::error::StageResult;
use crate::core::options::PipelineOptions;
use crate::core::pipeline::{PipelineRunner, StageOutcome};

/// Arguments for `relstage run`
#[derive(Args, Debug)]
pub struct RunArgs {
  /// Stage the working tree even if tracked files have uncommitted changes
  #[arg(long)]
  pub allow_dirty: bool,

  /// Populate the stage from this archive instead of the repository (repeatable)
  #[arg(short = 'i', long = "initial-archive", value_name = "ZIP")]
  pub initial_archives: Vec<PathBuf>,

  /// Continue from the previous stage's archive
  #[arg(short = 'c', long = "continue", conflicts_with = "initial_archives")]
  pub continue_stage: bool,

  /// Write the stage result to this archive
  #[arg(short, long, value_name = "ZIP")]
  pub output_archive: Option<PathBuf>,

  /// Replace an existing output archive without asking
  #[arg(short = 'f', long)]
  pub overwrite: bool,

  /// Write the output archive (required with --continue)
  #[arg(short, long)]
  pub write: bool,

  /// Leave matching paths out of the archive (repeatable)
  #[arg(long = "exclude-artifact", value_name = "PATTERN")]
  pub exclude_artifacts: Vec<String>,

  /// Keep matching paths in the archive even when ignored (repeatable)
  #[arg(long = "include-artifact", value_name = "PATTERN")]
  pub include_artifacts: Vec<String>,

  /// Keep the staging directory for inspection
  #[arg(long)]
  pub no_cleanup: bool,

  /// Show what would run without running it or writing an archive
  #[arg(long)]
  pub dry_run: bool,

  /// Answer yes to the overwrite prompt
  #[arg(short, long, conflicts_with = "no_overwrite")]
  pub yes: bool,

  /// Answer no to the overwrite prompt
  #[arg(long)]
  pub no_overwrite: bool,

  /// Print the stage outcome as JSON
  #[arg(long)]
  pub json: bool,

  /// Command to run inside the staging directory
  #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
  pub command: Vec<String>,
}

impl RunArgs {
  fn options(&self) -> PipelineOptions {
    let overwrite_answer = if self.yes {
      Some(true)
    } else if self.no_overwrite {
      Some(false)
    } else {
      None
    };

    PipelineOptions {
      allow_dirty: self.allow_dirty,
      initial_archives: self.initial_archives.clone(),
      output_archive: self.output_archive.clone(),
      overwrite: self.overwrite,
      write: self.write,
      continue_stage: self.continue_stage,
      exclude_artifacts: self.exclude_artifacts.clone(),
      include_artifacts: self.include_artifacts.clone(),
      no_cleanup: self.no_cleanup,
      dry_run: self.dry_run,
      overwrite_answer,
      json: self.json,
    }
  }
}

/// Run the run command
pub fn run_stage(args: RunArgs) -> StageResult<()> {
  let invocation_dir = env::current_dir()?;

  let mut options = args.options();
  if let Some(config) = RelstageConfig::load(&invocation_dir)? {
    config.apply(&mut options);
  }

  let outcome = PipelineRunner::new(options, &invocation_dir).run(&args.command)?;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
  } else {
    print_summary(&outcome);
  }
  Ok(())
}

fn print_summary(outcome: &StageOutcome) {
  if let Some(sha) = &outcome.sha256 {
    println!("   sha256: {}", sha);
  }
  if !outcome.skipped_entries.is_empty() {
    println!("   {} unreadable entries skipped", outcome.skipped_entries.len());
  }
}
