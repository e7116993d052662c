use crate::core::error::{ConfigError, StageError, StageResult, ResultExt};
use crate::core::options::PipelineOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Candidate config locations, relative to the invocation directory, in search order
const CONFIG_CANDIDATES: &[&str] = &["relstage.toml", ".relstage.toml", ".config/relstage.toml"];

/// Configuration for relstage
/// Searched in order: relstage.toml, .relstage.toml, .config/relstage.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelstageConfig {
  #[serde(default)]
  pub run: RunConfig,
}

/// Defaults for `relstage run`
///
/// Booleans are OR-ed with the matching command line flags; pattern lists are
/// prepended to the ones given on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
  /// Stage dirty working trees without --allow-dirty
  #[serde(default)]
  pub allow_dirty: bool,

  /// Keep staging directories for inspection
  #[serde(default)]
  pub no_cleanup: bool,

  /// Extra patterns removed from output archives
  #[serde(default)]
  pub exclude_artifacts: Vec<String>,

  /// Patterns kept in output archives even when ignored
  #[serde(default)]
  pub include_artifacts: Vec<String>,

  /// Pre-supplied answer for the overwrite prompt (unset: ask)
  #[serde(default)]
  pub overwrite_answer: Option<bool>,
}

impl RelstageConfig {
  /// First existing config file under `dir`
  pub fn find(dir: &Path) -> Option<PathBuf> {
    CONFIG_CANDIDATES
      .iter()
      .map(|candidate| dir.join(candidate))
      .find(|path| path.is_file())
  }

  /// Load the config for `dir`, or `None` when there is no config file
  pub fn load(dir: &Path) -> StageResult<Option<Self>> {
    let Some(path) = Self::find(dir) else {
      return Ok(None);
    };
    let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config = Self::parse(&text, &path)?;
    tracing::debug!(config = %path.display(), "loaded configuration");
    Ok(Some(config))
  }

  /// Parse config text; `path` is only used for error messages
  pub fn parse(text: &str, path: &Path) -> StageResult<Self> {
    toml_edit::de::from_str(text).map_err(|e| {
      StageError::Config(ConfigError::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
      })
    })
  }

  /// Fold config defaults into command line options
  pub fn apply(&self, options: &mut PipelineOptions) {
    let run = &self.run;
    options.allow_dirty |= run.allow_dirty;
    options.no_cleanup |= run.no_cleanup;
    options.exclude_artifacts = run
      .exclude_artifacts
      .iter()
      .cloned()
      .chain(options.exclude_artifacts.drain(..))
      .collect();
    options.include_artifacts = run
      .include_artifacts
      .iter()
      .cloned()
      .chain(options.include_artifacts.drain(..))
      .collect();
    if options.overwrite_answer.is_none() {
      options.overwrite_answer = run.overwrite_answer;
    }
  }
}
