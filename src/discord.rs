use crate::commands::{self, Commands};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::state::BotRuntimeState;
use anyhow::{Context as _, Result};
use serenity::all::{ActivityData, OnlineStatus};
use serenity::async_trait;
use serenity::model::application::Interaction;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PRESENCE_INTERVAL: Duration = Duration::from_secs(10);

const ACTIVITIES: &[&str] = &[
    "Helping with coding questions",
    "Tracking command usage stats",
    "Monitoring server performance",
    "Providing real-time programming assistance",
];

struct Handler {
    commands: Commands,
    presence_started: AtomicBool,
}

/// Cycle the bot's activity forever with the idle status.
async fn cycle_presence(ctx: serenity::client::Context) {
    let mut ticker = tokio::time::interval(PRESENCE_INTERVAL);
    for activity in ACTIVITIES.iter().cycle() {
        ticker.tick().await;
        ctx.set_presence(Some(ActivityData::playing(*activity)), OnlineStatus::Idle);
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: serenity::client::Context, ready: Ready) {
        tracing::info!("{} is connected!", ready.user.name);

        self.commands.state().set_servers(ready.guilds.len() as u64);

        match commands::register(&ctx).await {
            Ok(count) => tracing::info!("Registered {} slash commands", count),
            Err(e) => tracing::error!("Failed to register slash commands: {:#}", e),
        }

        // ready fires again on reconnect
        if !self.presence_started.swap(true, Ordering::AcqRel) {
            tokio::spawn(cycle_presence(ctx));
        }
    }

    async fn interaction_create(&self, ctx: serenity::client::Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            self.commands.dispatch(&ctx, &command).await;
        }
    }
}

pub async fn run_bot(config: &Config, state: Arc<BotRuntimeState>) -> Result<()> {
    let token = config
        .discord_bot_token
        .clone()
        .context("Discord bot token not configured. Run 'juno install' first.")?;
    let gemini = GeminiClient::from_config(config)?;

    tracing::info!("Starting Discord bot...");

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let handler = Handler {
        commands: Commands::new(state, gemini, config.pagination),
        presence_started: AtomicBool::new(false),
    };

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create Discord client")?;

    client.start().await.context("Discord client error")?;

    Ok(())
}
