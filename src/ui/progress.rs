//! Progress indicators for long-running staging steps
//!
//! Uses `linya` for allocation-free, concurrency-optimized progress bars.
//! Bars are only drawn when stderr is a terminal.

use linya::{Bar, Progress};
use std::io::IsTerminal;
use std::sync::{Arc, Mutex, MutexGuard};

/// Multi-bar progress for parallel operations
/// Thread-safe wrapper for concurrent progress tracking
#[derive(Clone)]
pub struct MultiProgress {
  progress: Arc<Mutex<Progress>>,
}

impl MultiProgress {
  /// Create a new multi-progress container
  pub fn new() -> Self {
    Self {
      progress: Arc::new(Mutex::new(Progress::new())),
    }
  }

  /// A container when stderr is interactive, `None` otherwise
  pub fn for_terminal() -> Option<Self> {
    std::io::stderr().is_terminal().then(Self::new)
  }

  /// Add a new bar with a label and total
  pub fn add_bar(&self, total: usize, label: impl Into<String>) -> Bar {
    self.lock().bar(total, label.into())
  }

  /// Increment a bar (thread-safe)
  pub fn inc(&self, bar: &Bar) {
    self.lock().inc_and_draw(bar, 1);
  }

  // A panic while drawing leaves the bars usable; nothing to recover.
  fn lock(&self) -> MutexGuard<'_, Progress> {
    self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl Default for MultiProgress {
  fn default() -> Self {
    Self::new()
  }
}
