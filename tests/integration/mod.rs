//! Integration tests for the relstage binary

mod helpers;
mod test_continue;
mod test_run;
