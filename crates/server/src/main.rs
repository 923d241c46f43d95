mod api;
mod db;
mod pg_gateway;
mod router;
mod startup;
mod state;

use clap::{Parser, Subcommand};

/// Bulk offer ingestion service.
#[derive(Parser, Debug)]
#[command(name = "offers-server", version, about)]
struct Cli {
    /// Bind address, overrides HOST.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Listen port, overrides PORT.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run migrations, recover abandoned tasks and serve HTTP (default).
    Serve,
    /// Run migrations, recover abandoned tasks and exit.
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    offers_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = offers_core::Config::from_env();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    config.log_summary();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => startup::serve(config).await,
        Command::Sweep => startup::sweep(config).await,
    }
}
