use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use timetable_notifier::cli::{commands, Cli, Commands};
use timetable_notifier::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref())?;

    if let Commands::Keys = cli.command {
        commands::print_keys();
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => commands::serve(config).await?,
        Commands::Check { notify, json } => commands::check(config, notify, json).await?,
        Commands::Init => commands::init(config).await?,
        Commands::Subscribers => commands::list_subscribers(config).await?,
        Commands::Keys => commands::print_keys(),
    }

    Ok(())
}

fn init_tracing(log: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }
    Ok(())
}
