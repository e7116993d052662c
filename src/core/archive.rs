//! Zip archive codec for stage inputs and outputs
//!
//! Extraction overwrites whatever is already on disk but never writes through a
//! symlink placed by an earlier entry. Creation collects entries
//! in parallel (walk + stat per top-level entry) and then streams them into a
//! single zip writer; an entry that cannot be read is reported and skipped
//! instead of failing the whole archive.

use crate::core::error::{ArchiveError, StageError, StageResult, ResultExt};
use crate::ui::progress::MultiProgress;
use crate::utils::{clear_path, is_contained_relative, path_to_git_format, symlink};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// One top-level item to place into an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
  /// Path on disk (file, directory or symlink)
  pub source: PathBuf,
  /// Name inside the archive, forward slashes, no trailing slash
  pub name: String,
}

impl EntrySpec {
  /// Entry for `relative` under `root`, stored under the same relative name
  pub fn relative(root: &Path, relative: &str) -> Self {
    Self {
      source: root.join(relative),
      name: relative.trim_end_matches('/').to_string(),
    }
  }
}

/// Outcome of writing an archive
#[derive(Debug, Default)]
pub struct WriteSummary {
  /// Number of zip records written (files, directories, symlinks)
  pub records: usize,
  /// Entries that were skipped, with the reason
  pub skipped: Vec<ArchiveError>,
}

#[derive(Debug)]
enum PendingKind {
  Directory,
  File { path: PathBuf, size: u64 },
  Symlink { target: String },
}

#[derive(Debug)]
struct Pending {
  name: String,
  mode: Option<u32>,
  kind: PendingKind,
}

/// Extract every entry of `archive_path` into `dest`, overwriting existing files
///
/// Returns the number of entries extracted.
pub fn extract(archive_path: &Path, dest: &Path) -> StageResult<usize> {
  let file = match File::open(archive_path) {
    Ok(file) => file,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      return Err(StageError::Archive(ArchiveError::NotFound {
        path: archive_path.to_path_buf(),
      }));
    }
    Err(e) => return Err(StageError::Io(e).context(format!("Failed to open {}", archive_path.display()))),
  };

  let corrupt = |reason: String| {
    StageError::Archive(ArchiveError::Corrupt {
      path: archive_path.to_path_buf(),
      reason,
    })
  };

  let mut archive = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;
  tracing::debug!(archive = %archive_path.display(), entries = archive.len(), "extracting archive");

  fs::create_dir_all(dest).with_context(|| format!("Failed to create {}", dest.display()))?;

  for idx in 0..archive.len() {
    let mut entry = archive.by_index(idx).map_err(|e| corrupt(e.to_string()))?;
    let name = entry.name().to_string();
    let relative = entry
      .enclosed_name()
      .filter(|p| is_contained_relative(p))
      .ok_or_else(|| corrupt(format!("unsafe entry path '{}'", name)))?;
    if let Some(link) = symlinked_ancestor(dest, &relative) {
      return Err(corrupt(format!(
        "entry '{}' lies below symlink {}",
        name,
        link.display()
      )));
    }
    let out = dest.join(&relative);
    let mode = entry.unix_mode();

    if entry.is_dir() {
      if out.is_file() || out.is_symlink() {
        fs::remove_file(&out)?;
      }
      fs::create_dir_all(&out).with_context(|| format!("Failed to create {}", out.display()))?;
      continue;
    }

    if let Some(parent) = out.parent() {
      fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    clear_path(&out).with_context(|| format!("Failed to replace {}", out.display()))?;

    if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
      let mut target = String::new();
      entry.read_to_string(&mut target).map_err(|e| corrupt(format!("{}: {}", name, e)))?;
      symlink(&target, &out).with_context(|| format!("Failed to create symlink {}", out.display()))?;
      continue;
    }

    let mut outfile = File::create(&out).with_context(|| format!("Failed to create {}", out.display()))?;
    io::copy(&mut entry, &mut outfile).map_err(|e| corrupt(format!("{}: {}", name, e)))?;
    drop(outfile);

    #[cfg(unix)]
    if let Some(mode) = mode {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))?;
    }
  }

  Ok(archive.len())
}

/// Write a new archive at `dest` containing `entries`
///
/// The archive is assembled in a temp file next to `dest` and persisted over it
/// only once complete, so a failed write never leaves a truncated archive.
pub fn create(dest: &Path, entries: &[EntrySpec], progress: Option<&MultiProgress>) -> StageResult<WriteSummary> {
  let bar = progress.map(|p| (p, p.add_bar(entries.len(), "Collecting archive entries")));

  let collected: Vec<(Vec<Pending>, Vec<ArchiveError>)> = entries
    .par_iter()
    .map(|spec| {
      let result = collect_entry(spec);
      if let Some((p, bar)) = &bar {
        p.inc(bar);
      }
      result
    })
    .collect();

  let parent = dest
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  let tmp = tempfile::NamedTempFile::new_in(parent)
    .with_context(|| format!("Failed to create temporary archive in {}", parent.display()))?;
  let mut zip = ZipWriter::new(tmp.as_file().try_clone()?);

  let mut summary = WriteSummary::default();
  for (pending, failures) in collected {
    for failure in failures {
      tracing::debug!("{}", failure);
      summary.skipped.push(failure);
    }

    for item in pending {
      match write_pending(&mut zip, item)? {
        None => summary.records += 1,
        Some(failure) => {
          tracing::debug!("{}", failure);
          summary.skipped.push(failure);
        }
      }
    }
  }

  zip.finish()?;
  tmp
    .persist(dest)
    .with_context(|| format!("Failed to write archive {}", dest.display()))?;

  tracing::debug!(
    archive = %dest.display(),
    records = summary.records,
    skipped = summary.skipped.len(),
    "archive written"
  );
  Ok(summary)
}

/// List the entry names of an archive, in archive order
#[cfg(test)]
pub fn entry_names(archive_path: &Path) -> StageResult<Vec<String>> {
  let file = File::open(archive_path).map_err(|_| {
    StageError::Archive(ArchiveError::NotFound {
      path: archive_path.to_path_buf(),
    })
  })?;
  let archive = ZipArchive::new(file).map_err(|e| {
    StageError::Archive(ArchiveError::Corrupt {
      path: archive_path.to_path_buf(),
      reason: e.to_string(),
    })
  })?;
  Ok(archive.file_names().map(str::to_string).collect())
}

/// Walk one top-level entry into pending records
///
/// A top-level entry that cannot be stat'ed is skipped as a whole; unreadable
/// items below a directory are skipped individually.
fn collect_entry(spec: &EntrySpec) -> (Vec<Pending>, Vec<ArchiveError>) {
  let meta = match fs::symlink_metadata(&spec.source) {
    Ok(meta) => meta,
    Err(e) => return (vec![], vec![entry_failed(&spec.name, e.to_string())]),
  };

  if !meta.is_dir() {
    tracing::debug!("Adding file {} to archive", spec.name);
    return match pending_for(&spec.source, spec.name.clone(), &meta) {
      Ok(item) => (vec![item], vec![]),
      Err(e) => (vec![], vec![entry_failed(&spec.name, e.to_string())]),
    };
  }

  tracing::debug!("Adding directory {} to archive", spec.name);
  let mut pending = Vec::new();
  let mut failures = Vec::new();

  for item in WalkDir::new(&spec.source).follow_links(false).sort_by_file_name() {
    let item = match item {
      Ok(item) => item,
      Err(e) => {
        let name = e
          .path()
          .and_then(|p| p.strip_prefix(&spec.source).ok())
          .map(|rel| join_name(&spec.name, rel))
          .unwrap_or_else(|| spec.name.clone());
        failures.push(entry_failed(&name, e.to_string()));
        continue;
      }
    };

    let rel = match item.path().strip_prefix(&spec.source) {
      Ok(rel) => rel,
      Err(e) => {
        failures.push(entry_failed(&spec.name, e.to_string()));
        continue;
      }
    };
    let name = join_name(&spec.name, rel);

    match item.metadata() {
      Ok(meta) => match pending_for(item.path(), name.clone(), &meta) {
        Ok(p) => pending.push(p),
        Err(e) => failures.push(entry_failed(&name, e.to_string())),
      },
      Err(e) => failures.push(entry_failed(&name, e.to_string())),
    }
  }

  (pending, failures)
}

/// Write one record into the archive
///
/// Problems with the entry itself (unreadable source, rejected name) skip it
/// and are returned. I/O errors on the archive file fail the whole write.
fn write_pending(zip: &mut ZipWriter<File>, item: Pending) -> StageResult<Option<ArchiveError>> {
  let large = matches!(item.kind, PendingKind::File { size, .. } if size >= u64::from(u32::MAX));
  let options = entry_options(item.mode, large);
  let name = item.name;

  let added = match item.kind {
    PendingKind::Directory => zip.add_directory(name.as_str(), options),
    PendingKind::Symlink { target } => zip.add_symlink(name.as_str(), target.as_str(), options),
    PendingKind::File { path, .. } => {
      let mut source = match File::open(&path) {
        Ok(source) => source,
        Err(e) => return Ok(Some(entry_failed(&name, e.to_string()))),
      };
      if let Err(e) = zip.start_file(name.as_str(), options) {
        return zip_failure(&name, e);
      }

      let mut buf = vec![0u8; 64 * 1024];
      loop {
        let n = match source.read(&mut buf) {
          Ok(0) => break,
          Ok(n) => n,
          Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
          Err(e) => {
            // Drop the half-written record so the archive stays readable.
            zip
              .abort_file()
              .with_context(|| format!("Failed to discard {} from archive", name))?;
            return Ok(Some(entry_failed(&name, e.to_string())));
          }
        };
        zip
          .write_all(&buf[..n])
          .with_context(|| format!("Failed to write {} to archive", name))?;
      }
      Ok(())
    }
  };

  match added {
    Ok(()) => Ok(None),
    Err(e) => zip_failure(&name, e),
  }
}

fn zip_failure(name: &str, err: ZipError) -> StageResult<Option<ArchiveError>> {
  match err {
    ZipError::Io(e) => Err(StageError::Io(e).context(format!("Failed to write {} to archive", name))),
    other => Ok(Some(entry_failed(name, other.to_string()))),
  }
}

fn entry_failed(entry: &str, reason: String) -> ArchiveError {
  ArchiveError::EntryFailed {
    entry: entry.to_string(),
    reason,
  }
}

/// First path strictly between `dest` and `dest/relative` that is a symlink
fn symlinked_ancestor(dest: &Path, relative: &Path) -> Option<PathBuf> {
  let mut current = dest.to_path_buf();
  let mut components = relative.components().peekable();
  while let Some(component) = components.next() {
    if components.peek().is_none() {
      break;
    }
    current.push(component);
    if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
      return Some(current);
    }
  }
  None
}

fn pending_for(path: &Path, name: String, meta: &fs::Metadata) -> io::Result<Pending> {
  let mode = unix_mode(meta);
  let kind = if meta.file_type().is_symlink() {
    let target = fs::read_link(path)?;
    PendingKind::Symlink {
      target: path_to_git_format(&target),
    }
  } else if meta.is_dir() {
    PendingKind::Directory
  } else {
    PendingKind::File {
      path: path.to_path_buf(),
      size: meta.len(),
    }
  };
  Ok(Pending { name, mode, kind })
}

fn entry_options(mode: Option<u32>, large: bool) -> SimpleFileOptions {
  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .large_file(large);
  match mode {
    Some(mode) => options.unix_permissions(mode & 0o7777),
    None => options,
  }
}

fn join_name(base: &str, rel: &Path) -> String {
  if rel.as_os_str().is_empty() {
    base.to_string()
  } else {
    format!("{}/{}", base, path_to_git_format(rel))
  }
}

#[cfg(unix)]
fn unix_mode(meta: &fs::Metadata) -> Option<u32> {
  use std::os::unix::fs::PermissionsExt;
  Some(meta.permissions().mode())
}

#[cfg(not(unix))]
fn unix_mode(_meta: &fs::Metadata) -> Option<u32> {
  None
}
