//! Staging directory lifecycle
//!
//! A [`StageManager`] owns one uniquely named temp directory for the duration of
//! a pipeline stage: `Empty -> Populated -> Executed -> Finalized`. It fills the
//! directory from the live repository or from input archives, and it releases
//! the directory on every exit path (explicit [`StageManager::finalize`], or
//! `Drop` when an error unwinds past it).

use crate::core::archive;
use crate::core::error::{PipelineError, StageError, StageResult, ResultExt};
use crate::core::vcs::{GIT_DIR, SystemGit};
use crate::ui::progress::MultiProgress;
use crate::utils::{clear_path, symlink};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Prefix for staging directory names under the system temp dir
const STAGE_PREFIX: &str = "relstage-";

/// Prefix for per-archive scratch directories during multi-archive extraction
const UNPACK_PREFIX: &str = "relstage-unpack-";

/// Lifecycle state of a staging directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
  Empty,
  Populated,
  Executed,
  Finalized,
}

/// Exclusive owner of one staging directory
pub struct StageManager {
  dir: Option<TempDir>,
  root: PathBuf,
  state: StageState,
  keep: bool,
  initial_dirty: bool,
}

impl StageManager {
  /// Create a fresh, uniquely named staging directory
  ///
  /// With `keep` set the directory survives [`StageManager::finalize`] for
  /// inspection.
  pub fn create(keep: bool) -> StageResult<Self> {
    let dir = tempfile::Builder::new()
      .prefix(STAGE_PREFIX)
      .tempdir()
      .context("Failed to create staging directory")?;
    let root = dir.path().to_path_buf();
    tracing::debug!(stage = %root.display(), "created staging directory");

    Ok(Self {
      dir: Some(dir),
      root,
      state: StageState::Empty,
      keep,
      initial_dirty: false,
    })
  }

  /// Staging directory path
  pub fn root(&self) -> &Path {
    &self.root
  }

  #[cfg(test)]
  pub fn state(&self) -> StageState {
    self.state
  }

  /// Whether the stage was populated from a dirty working tree
  pub fn initial_dirty(&self) -> bool {
    self.initial_dirty
  }

  /// Whether the staged tree carries version-control metadata
  pub fn has_git_dir(&self) -> bool {
    self.root.join(GIT_DIR).exists()
  }

  /// Populate from input archives
  ///
  /// Archives are extracted concurrently into private scratch directories and
  /// merged into the stage in listed order, so a path present in several
  /// archives ends up with the content of the last one listed. A staged `.git`
  /// is then reset to its committed state. Archive stages count as clean.
  pub fn populate_from_archives(&mut self, archives: &[PathBuf], progress: Option<&MultiProgress>) -> StageResult<bool> {
    self.expect_state(StageState::Empty, "populate")?;

    match archives {
      [] => {}
      [single] => {
        archive::extract(single, &self.root)?;
      }
      _ => {
        let bar = progress.map(|p| (p, p.add_bar(archives.len(), "Unzipping archives into staging directory")));

        let unpacked: Vec<TempDir> = archives
          .par_iter()
          .map(|path| -> StageResult<TempDir> {
            let scratch = tempfile::Builder::new()
              .prefix(UNPACK_PREFIX)
              .tempdir()
              .context("Failed to create scratch directory")?;
            archive::extract(path, scratch.path())?;
            if let Some((p, bar)) = &bar {
              p.inc(bar);
            }
            Ok(scratch)
          })
          .collect::<StageResult<_>>()?;

        for (path, scratch) in archives.iter().zip(&unpacked) {
          tracing::debug!(archive = %path.display(), "merging into stage");
          copy_tree(scratch.path(), &self.root)?;
        }
      }
    }

    if self.has_git_dir() {
      SystemGit::at_root(&self.root)?.reset_hard()?;
    }

    self.initial_dirty = false;
    self.state = StageState::Populated;
    Ok(false)
  }

  /// Populate from the live repository
  ///
  /// Clean trees stage only the metadata and check the last commit out from
  /// it; dirty trees (when allowed) are copied verbatim, uncommitted state
  /// included. Returns whether the repository was dirty.
  pub fn populate_from_repository(&mut self, repo: &SystemGit, allow_dirty: bool) -> StageResult<bool> {
    self.expect_state(StageState::Empty, "populate")?;

    let dirty_files = repo.tracked_dirty_files()?;
    let dirty = !dirty_files.is_empty();
    if dirty && !allow_dirty {
      return Err(StageError::Pipeline(PipelineError::DirtyRepository {
        files: dirty_files.into_vec(),
      }));
    }

    let metadata = repo.root().join(GIT_DIR);
    if metadata.is_file() {
      return Err(StageError::message(format!(
        "{} is a gitfile (linked worktree or submodule); staging needs a standalone repository",
        metadata.display()
      )));
    }

    if dirty {
      copy_tree(repo.root(), &self.root)?;
    } else {
      copy_tree(&metadata, &self.root.join(GIT_DIR))?;
      SystemGit::at_root(&self.root)?.reset_hard()?;
    }

    self.initial_dirty = dirty;
    self.state = StageState::Populated;
    Ok(dirty)
  }

  /// Record that the staged command ran
  pub fn mark_executed(&mut self) {
    if self.state == StageState::Populated {
      self.state = StageState::Executed;
    }
  }

  /// Release the staging directory
  ///
  /// Returns the kept path when cleanup is suppressed.
  pub fn finalize(mut self) -> StageResult<Option<PathBuf>> {
    self.state = StageState::Finalized;
    let Some(dir) = self.dir.take() else {
      return Ok(None);
    };

    if self.keep {
      let path = dir.keep();
      Ok(Some(path))
    } else {
      dir
        .close()
        .with_context(|| format!("Failed to remove staging directory {}", self.root.display()))?;
      Ok(None)
    }
  }

  fn expect_state(&self, expected: StageState, action: &str) -> StageResult<()> {
    if self.state != expected {
      return Err(StageError::message(format!(
        "Cannot {} staging directory in state {:?}",
        action, self.state
      )));
    }
    Ok(())
  }
}

impl Drop for StageManager {
  fn drop(&mut self) {
    if let Some(dir) = self.dir.take() {
      if self.keep {
        let _ = dir.keep();
      }
      // Otherwise TempDir's own Drop removes the tree.
    }
  }
}

/// Recursively copy `src` onto `dst`, overwriting existing content
///
/// Hidden entries are included, symlinks are recreated rather than followed,
/// and anything in the way of a copied entry is replaced. `dst` itself is never
/// descended into, so copying a tree into a directory nested below it is safe.
pub fn copy_tree(src: &Path, dst: &Path) -> StageResult<usize> {
  let mut copied = 0;

  for entry in WalkDir::new(src)
    .follow_links(false)
    .into_iter()
    .filter_entry(|e| e.path() != dst)
  {
    let entry = entry?;
    let rel = entry.path().strip_prefix(src)?;
    let target = if rel.as_os_str().is_empty() {
      dst.to_path_buf()
    } else {
      dst.join(rel)
    };
    let file_type = entry.file_type();

    if file_type.is_dir() {
      if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
        clear_path(&target)?;
      }
      fs::create_dir_all(&target).with_context(|| format!("Failed to create {}", target.display()))?;
      continue;
    }

    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    clear_path(&target).with_context(|| format!("Failed to replace {}", target.display()))?;

    if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      symlink(&link, &target).with_context(|| format!("Failed to create symlink {}", target.display()))?;
    } else {
      fs::copy(entry.path(), &target)
        .with_context(|| format!("Failed to copy {} to {}", entry.path().display(), target.display()))?;
    }
    copied += 1;
  }

  tracing::debug!(src = %src.display(), dst = %dst.display(), files = copied, "copied tree");
  Ok(copied)
}
