//! Terminal-facing helpers: status output, prompts, progress bars

pub mod log;
pub mod progress;
pub mod prompt;
