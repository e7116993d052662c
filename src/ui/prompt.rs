//! Yes/no confirmation used before overwriting an existing archive

use crate::core::error::StageResult;
use std::io::{self, BufRead, IsTerminal, Write};

/// Source of yes/no answers
pub trait Confirm {
  /// Ask `message`; `default` is used when the user just presses Enter
  fn confirm(&self, message: &str, default: bool) -> StageResult<bool>;
}

/// Interactive prompt on stdin/stdout
///
/// Without a terminal on stdin there is nobody to ask, so the default answer
/// is returned.
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
  fn confirm(&self, message: &str, default: bool) -> StageResult<bool> {
    if !io::stdin().is_terminal() {
      tracing::debug!("stdin is not a terminal, answering {} to: {}", default, message);
      return Ok(default);
    }

    let hint = if default { "[Y/n]" } else { "[y/N]" };
    print!("? {} {} ", message, hint);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(parse_answer(&input).unwrap_or(default))
  }
}

/// Pre-supplied answer, for scripted runs
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
  fn confirm(&self, message: &str, _default: bool) -> StageResult<bool> {
    tracing::debug!("answering {} to: {}", self.0, message);
    Ok(self.0)
  }
}

/// Interpret a typed answer; `None` for empty or unrecognised input
fn parse_answer(input: &str) -> Option<bool> {
  match input.trim().to_ascii_lowercase().as_str() {
    "y" | "yes" => Some(true),
    "n" | "no" => Some(false),
    _ => None,
  }
}
