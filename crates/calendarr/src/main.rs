//! calendarr CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use calendarr::cli::{Cli, Command, ConfigAction};
use calendarr::error::ClientResult;
use calendarr::{commands, config};
use calendarr_core::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.tracing_config()) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let explicit = cli.config.is_some();
    let path = config::resolve_path(cli.config.as_deref());

    match cli.resolved_command() {
        Command::Run => commands::run::run(config::load_run_settings(&path, explicit)?).await,
        Command::Once => commands::once::once(config::load_run_settings(&path, explicit)?).await,
        Command::Preview { platform } => {
            let settings = config::load_run_settings(&path, explicit)?;
            commands::preview::preview(settings, platform).await
        }
        Command::Config { action } => match action {
            ConfigAction::Path => commands::config::path(&path),
            ConfigAction::Show => commands::config::show(&path, explicit),
            ConfigAction::Validate => commands::config::validate(&path, explicit),
        },
    }
}
