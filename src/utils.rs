//! Utility functions for cross-platform path handling

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Convert a path to Git format (always forward slashes)
///
/// Git and zip both expect forward slashes, even on Windows.
pub fn path_to_git_format(path: &Path) -> String {
  #[cfg(target_os = "windows")]
  {
    path.to_string_lossy().replace('\\', "/")
  }
  #[cfg(not(target_os = "windows"))]
  {
    path.to_string_lossy().to_string()
  }
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  }
}

/// True when a relative path stays inside its root (no `..`, no root/prefix)
pub fn is_contained_relative(path: &Path) -> bool {
  !path.as_os_str().is_empty()
    && path
      .components()
      .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Remove whatever occupies `path` (file, symlink or directory tree)
///
/// Read-only files are removed too, which `fs::copy` onto them would not allow.
pub fn clear_path(path: &Path) -> io::Result<()> {
  match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Create a symlink at `link` pointing to `target`
#[cfg(unix)]
pub fn symlink(target: impl AsRef<Path>, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

/// No portable symlinks; the target path is stored as file content.
#[cfg(not(unix))]
pub fn symlink(target: impl AsRef<Path>, link: &Path) -> io::Result<()> {
  fs::write(link, path_to_git_format(target.as_ref()))
}
