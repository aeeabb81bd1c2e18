use clap::Parser;
use tracing_subscriber::EnvFilter;

use framez::commands::{self, Command, Output};
use framez::config::{Config, ConfigArgs};
use framez::state::App;

#[derive(Parser, Debug)]
#[command(name = "framez", about = "Share posts, likes and comments from the terminal")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    tracing::info!("Data directory: {}", config.data_path().display());

    let app = App::open(config).await?;

    let output = if cli.json { Output::Json } else { Output::Text };
    if let Err(e) = commands::run(&app, cli.command, output).await {
        anyhow::bail!(e.user_message());
    }
    Ok(())
}
