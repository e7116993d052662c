//! CLI commands for relstage
//!
//! - **run**: Run one pipeline stage (stage, execute, archive)

pub mod run;

pub use run::{RunArgs, run_stage};
