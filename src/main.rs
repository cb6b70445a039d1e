use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use livehub::app::AppContext;
use livehub::cli::{commands, Cli, Commands};
use livehub::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("livehub=info")))
        .init();

    let cli = Cli::parse();

    if let Commands::Parse { path } = &cli.command {
        commands::parse_file(path)?;
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::new(&config, cli.db.clone())?;

    match cli.command {
        Commands::Serve => {
            commands::serve(Arc::new(ctx), config).await?;
        }
        Commands::Add { channel_ids } => {
            commands::add_channels(&ctx, &channel_ids).await?;
        }
        Commands::Renew => {
            commands::renew(&ctx).await?;
        }
        Commands::Clean => {
            commands::clean(&ctx).await?;
        }
        Commands::Sync { channel_ids } => {
            commands::sync(&ctx, &channel_ids).await?;
        }
        Commands::Unsubscribe { channel_id } => {
            commands::unsubscribe(&ctx, &channel_id).await?;
        }
        Commands::Parse { path } => {
            commands::parse_file(&path)?;
        }
    }

    Ok(())
}
