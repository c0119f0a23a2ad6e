//! Porter - invite-based role assignment bot
//!
//! Attributes each member join to the invite that was used and grants the
//! role mapped to that invite. Gateway events arrive from a bridge process
//! over the intake server; platform calls go through the REST API.

use std::sync::Arc;

use porter_core::{CommandHandler, InviteTracker, PorterState};
use porter_net::{DiscordRest, IntakeServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod bot_runtime;
mod config;

use bot_runtime::BotRuntime;
use config::Config;

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), porter_net::Error> {
    tracing::info!(listen = %config.listen, "Starting Porter");

    let platform = Arc::new(DiscordRest::with_base(
        config.discord_token.clone(),
        config.api_base.clone(),
    )?);
    let state = Arc::new(PorterState::new());

    let (server, events) = IntakeServer::start(config.listen, config.bridge_token.clone()).await?;
    let server = Arc::new(server);

    let mut bot = BotRuntime::new(
        InviteTracker::new(platform.clone(), state.clone()),
        CommandHandler::with_prefix(platform, state, config.command_prefix.clone()),
        server.clone(),
    );

    tokio::select! {
        _ = bot.run(events) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    server.shutdown();
    bot.shutdown().await;
    tracing::info!("Porter stopped");
    Ok(())
}
