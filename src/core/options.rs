//! Per-invocation pipeline options and their normalization into a stage plan

use crate::utils::resolve_against;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Conventional archive name shared between stages, so `--continue` can find
/// the previous stage's output without being told
pub const DEFAULT_ARCHIVE: &str = "rel-archive.zip";

/// Options for one stage, as given by the user
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOptions {
  /// Stage a working tree with uncommitted tracked changes
  pub allow_dirty: bool,
  /// Archives to populate the stage from instead of the repository
  pub initial_archives: Vec<PathBuf>,
  /// Explicit output archive (`None`: not requested on the command line)
  pub output_archive: Option<PathBuf>,
  /// Replace an existing output archive without asking
  pub overwrite: bool,
  /// Write the output archive (to the default location unless named)
  pub write: bool,
  /// Chain from the previous stage's default archive
  pub continue_stage: bool,
  /// Extra patterns removed from the output archive
  pub exclude_artifacts: Vec<String>,
  /// Patterns kept in the output archive even when ignored
  pub include_artifacts: Vec<String>,
  /// Keep the staging directory afterwards
  pub no_cleanup: bool,
  /// Report the command instead of running it
  pub dry_run: bool,
  /// Pre-supplied answer for the overwrite confirmation
  pub overwrite_answer: Option<bool>,  /// Stdout carries the JSON report; the command's stdout goes to stderr
  pub json: bool,
}

/// Normalized, path-resolved decisions for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
  /// Input archives (empty: stage the live repository)
  pub inputs: Vec<PathBuf>,
  /// Output archive (`None`: this stage writes nothing)
  pub output: Option<PathBuf>,
  /// Overwrite an existing output without confirmation
  pub overwrite: bool,
}

impl PipelineOptions {
  /// Apply the normalization rules, resolving paths against `invocation_dir`
  ///
  /// 1. No explicit output, `overwrite` or `write` set, default archive
  ///    present: adopt the default archive.
  /// 2. Continuation: default archive as sole input when none were given; no
  ///    output without `write`/`overwrite`; `write` forces `overwrite`.
  /// 3. Any output still unset falls back to the default archive.
  pub fn normalize(&self, invocation_dir: &Path) -> StagePlan {
    let default_archive = invocation_dir.join(DEFAULT_ARCHIVE);
    let mut output = self
      .output_archive
      .as_deref()
      .map(|path| resolve_against(invocation_dir, path));
    let mut inputs: Vec<PathBuf> = self
      .initial_archives
      .iter()
      .map(|path| resolve_against(invocation_dir, path))
      .collect();
    let mut overwrite = self.overwrite;
    let mut output_disabled = false;

    if output.is_none() && (self.overwrite || self.write) && default_archive.exists() {
      output = Some(default_archive.clone());
    }

    if self.continue_stage {
      if inputs.is_empty() {
        inputs.push(default_archive.clone());
      }
      if !self.write && !self.overwrite {
        output_disabled = true;
      } else if self.write {
        overwrite = true;
      }
    }

    let output = if output_disabled {
      None
    } else {
      Some(output.unwrap_or(default_archive))
    };

    StagePlan {
      inputs,
      output,
      overwrite,
    }
  }
}
