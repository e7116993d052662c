//! Status output and diagnostic logging
//!
//! Status lines go straight to the terminal; everything else is `tracing`
//! output filtered by `RELSTAGE_LOG` (default `warn`, `debug` with --verbose).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "RELSTAGE_LOG";

/// Initialise the global tracing subscriber (stderr, no targets)
pub fn init(verbose: bool) {
  let default = if verbose { "relstage=debug" } else { "warn" };
  let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
    .try_init()
    .ok();
}

/// Print a status line
///
/// Status goes to stderr; stdout is reserved for results such as `--json`.
pub fn info(message: impl AsRef<str>) {
  eprintln!("{}", message.as_ref());
}

/// Print a non-fatal warning
pub fn warn(message: impl AsRef<str>) {
  let style = anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
  eprintln!("{}⚠️  {}{}", style.render(), message.as_ref(), style.render_reset());
}
