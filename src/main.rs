mod commands;
mod core;
mod ui;
mod utils;

use clap::{Parser, Subcommand};
use crate::core::error::{StageError, print_error};

/// Stage a repository in a temp dir, run a release command there, archive the result
#[derive(Parser)]
#[command(name = "relstage")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  /// Verbose diagnostics (overridden by RELSTAGE_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a command in a fresh staging directory and archive the result
  Run(commands::RunArgs),
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  let cli = Cli::parse();
  ui::log::init(cli.verbose);

  // Without the handler Ctrl-C or SIGTERM would kill us before the stage is released.
  if let Err(e) = crate::core::executor::install_interrupt_handler() {
    tracing::warn!("{}", e);
  }

  let result = match cli.command {
    Commands::Run(args) => commands::run_stage(args),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: StageError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
