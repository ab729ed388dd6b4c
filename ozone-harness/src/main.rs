use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use ozone_harness::cli::{Cli, Commands};
use ozone_harness::commands;
use ozone_harness::error::CliError;
use ozone_harness::logging::init_tracing;
use ozone_harness::metrics_server::install_metrics_recorder;
use ozone_harness::output::OutputWriter;
use ozone_harness_core::{AppRegistry, HarnessConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // defaults -> file -> environment -> flags
    let mut config = HarnessConfig::load_layers(&cli.config).await?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_tracing(&config.general)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    if config.metrics.enabled {
        install_metrics_recorder(&config.metrics)?;
    }

    let registry = AppRegistry::with_overrides(&config.apps)?;
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Up(args) => commands::up::execute(args, &config, &registry, &writer).await,
        Commands::Files(args) => commands::files::execute(&args, &registry, &writer),
        Commands::Check(args) => {
            commands::check::execute(&args, &config, &registry, &writer).await
        }
        Commands::Apps => commands::apps::execute(&registry, &writer),
    }
}
