mod cli;
mod commands;
mod config;
mod dashboard;
mod discord;
mod gemini;
mod pager;
mod presenter;
mod reply;
mod state;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use gemini::GeminiClient;
use pager::PageSet;
use state::BotRuntimeState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "juno=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Daemon => {
            tracing::info!("Starting Juno daemon...");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_daemon())?;
        }
        Command::Run { prompt, page_size } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                tracing::info!("Running single prompt...");
                let config = Config::load()?;
                let gemini = GeminiClient::from_config(&config)?;
                let response = gemini.generate(&prompt).await?;

                let pages = PageSet::build(
                    &response,
                    page_size.unwrap_or(config.pagination.max_page_size),
                )?;
                for (index, page) in pages.pages().iter().enumerate() {
                    println!("--- Page {} of {} ---", index + 1, pages.count());
                    println!("{}", page);
                }
                Ok::<_, anyhow::Error>(())
            })?;
        }
        Command::Install => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                tracing::info!("Running installation...");
                config::install().await?;
                Ok::<_, anyhow::Error>(())
            })?;
        }
        Command::Config => {
            config::show()?;
        }
    }

    Ok(())
}

async fn run_daemon() -> Result<()> {
    let config = Config::load()?;
    let state = Arc::new(BotRuntimeState::new(config.owner_id));

    if config.owner_id.is_none() {
        tracing::warn!("No owner configured, /lock and /reload-commands are disabled");
    }

    tokio::select! {
        result = discord::run_bot(&config, state.clone()) => {
            if let Err(e) = &result {
                tracing::error!("Discord bot error: {:#}", e);
            }
            result?;
        }
        result = dashboard::serve(config.dashboard_port, state.clone()) => {
            if let Err(e) = &result {
                tracing::error!("Dashboard error: {:#}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
        }
    }

    tracing::info!("Juno daemon stopped");
    Ok(())
}
