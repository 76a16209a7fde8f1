//! Herald - translating chat bridge between a game server and Discord.
//!
//! Relays chat between the game server plugin and a Discord channel,
//! translating each message into every reader's preferred language.

mod bridge;
mod common;
mod config;
mod discord;
mod game;

use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};

use bridge::sink::PlatformClient;
use bridge::BridgeContext;
use config::{env::get_config_path, load_and_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Herald v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Default language: {}", config.server.default_language);
    info!("  Game link: {}", config.game_link.bind);
    info!("  Discord: {}", if config.discord.enabled { "enabled" } else { "disabled" });
    info!(
        "  Translation: {}",
        if config.translation.enabled { config.translation.endpoint.as_str() } else { "disabled" }
    );

    let context = BridgeContext::build(config, Some(config_path)).await?;

    // ============================================================
    // Start game link and Discord bot
    // ============================================================
    let mut link_task = {
        let link = context.game_link();
        let bind = context.config.game_link.bind.clone();
        tokio::spawn(async move { link.run(&bind).await })
    };

    let mut discord_task = match context.discord_bot() {
        Some(bot) => {
            info!("Starting Discord bot...");
            tokio::spawn(bot.run())
        }
        None => tokio::spawn(std::future::pending::<()>()),
    };

    let mut link_done = false;
    let mut discord_done = false;
    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - draining in-flight messages...");
            true
        }
        result = &mut link_task => {
            match result {
                Ok(Ok(())) => warn!("Game link stopped unexpectedly"),
                Ok(Err(e)) => error!("Game link failed: {:#}", e),
                Err(e) => error!("Game link task panicked: {}", e),
            }
            link_done = true;
            false
        }
        _ = &mut discord_task => {
            warn!("Discord task ended unexpectedly");
            discord_done = true;
            false
        }
    };

    // Announce before the Discord session goes away
    if shutdown && context.config.discord.enabled {
        if let Some(message) = context.announcements.stopped() {
            if let Err(e) = context.platform.send_text(context.config.discord.channel, &message).await {
                warn!("Failed to announce server stop: {}", e);
            }
        }
    }

    let grace = Duration::from_secs(context.config.server.shutdown_grace_secs);
    if context.router.shutdown(grace).await {
        info!("All in-flight messages delivered");
    }

    context.control.shutdown();
    let timeout = Duration::from_secs(5);
    if !link_done && tokio::time::timeout(timeout, link_task).await.is_err() {
        warn!("Game link did not stop in time");
    }
    if !discord_done {
        if context.config.discord.enabled {
            match tokio::time::timeout(timeout, discord_task).await {
                Ok(Ok(())) => info!("Discord disconnected gracefully"),
                Ok(Err(e)) => warn!("Discord task panicked: {}", e),
                Err(_) => warn!("Discord shutdown timed out"),
            }
        } else {
            discord_task.abort();
        }
    }

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
