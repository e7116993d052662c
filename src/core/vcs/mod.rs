pub mod system_git;

pub use system_git::SystemGit;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// General-purpose ignore file honoured when listing untracked files
pub const GITIGNORE: &str = ".gitignore";

/// Tool-specific ignore file layered on top of `.gitignore`
pub const RELIGNORE: &str = ".relignore";

/// Version-control metadata directory name
pub const GIT_DIR: &str = ".git";

/// Which side of the working tree a [`FileSet`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
  /// Tracked files with uncommitted modifications or additions
  TrackedDirty,
  /// Files on disk that are neither committed nor ignored
  Untracked,
}

/// Ordered, de-duplicated set of repository-relative paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
  kind: FileKind,
  paths: BTreeSet<String>,
}

impl FileSet {
  pub fn new(kind: FileKind) -> Self {
    Self {
      kind,
      paths: BTreeSet::new(),
    }
  }

  pub fn from_paths<I, S>(kind: FileKind, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut set = Self::new(kind);
    for path in paths {
      set.insert(path);
    }
    set
  }

  /// Insert a path, normalizing away trailing separators
  pub fn insert(&mut self, path: impl Into<String>) -> bool {
    let path = path.into();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
      return false;
    }
    self.paths.insert(trimmed.to_string())
  }

  pub fn kind(&self) -> FileKind {
    self.kind
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  #[cfg(test)]
  pub fn contains(&self, path: &str) -> bool {
    self.paths.contains(path)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.paths.iter().map(String::as_str)
  }

  /// Drop entries that live under another entry of the set
  ///
  /// `git ls-files --directory` reports wholly untracked directories once; a
  /// second query may still yield paths beneath them.
  pub fn collapse_nested(&mut self) {
    let mut kept: BTreeSet<String> = BTreeSet::new();
    // BTreeSet order puts "a" before "a/b", so ancestors are seen first.
    // "a-b" sorts between them, hence the explicit ancestor walk.
    for path in &self.paths {
      let covered = ancestors(path).any(|ancestor| kept.contains(ancestor));
      if !covered {
        kept.insert(path.clone());
      }
    }
    self.paths = kept;
  }

  pub fn into_vec(self) -> Vec<String> {
    self.paths.into_iter().collect()
  }
}

/// Proper ancestors of a slash-separated relative path, nearest first
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
  path.rmatch_indices('/').map(move |(idx, _)| &path[..idx])
}

/// Ignore configuration for untracked-file listing
///
/// Include patterns always win: over exclude patterns, over ignore files, and
/// over an excluded parent directory.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
  /// Ignore files (absolute paths) passed to git as `--exclude-from`
  pub ignore_files: Vec<PathBuf>,
  /// Extra patterns removed from the untracked set
  pub exclude: Vec<String>,
  /// Patterns re-admitted even if otherwise ignored
  pub include: Vec<String>,
}

impl IgnoreRules {
  /// Rules for a checkout rooted at `root`: its `.gitignore` and `.relignore`
  /// (when present) plus the per-invocation patterns
  pub fn for_root(root: &Path, exclude: &[String], include: &[String]) -> Self {
    let ignore_files = [GITIGNORE, RELIGNORE]
      .iter()
      .map(|name| root.join(name))
      .filter(|path| path.is_file())
      .collect();

    Self {
      ignore_files,
      exclude: exclude.to_vec(),
      include: include.to_vec(),
    }
  }

  /// Command-line pattern list in git order: excludes, then negated includes
  ///
  /// Among `-x` patterns the last match wins, so includes come last.
  pub fn exclude_patterns(&self) -> Vec<String> {
    self
      .exclude
      .iter()
      .cloned()
      .chain(self.include.iter().map(|pattern| format!("!{}", pattern)))
      .collect()
  }
}
