//! Core engine for relstage
//!
//! - **archive**: Zip codec for stage inputs and outputs
//! - **config**: relstage.toml parsing
//! - **error**: Error types with contextual help messages and exit codes
//! - **executor**: Shell and dry-run command execution, Ctrl-C tracking
//! - **options**: Per-invocation options and their normalization
//! - **pipeline**: One stage end to end (populate, run, archive, finalize)
//! - **stage**: Staging directory lifecycle and population
//! - **vcs**: Git queries (SystemGit) and file set types

pub mod archive;
pub mod config;
pub mod error;
pub mod executor;
pub mod options;
pub mod pipeline;
pub mod stage;
pub mod vcs;
