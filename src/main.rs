use std::sync::Arc;

use anyhow::Context;

use profile_bot::bot::Bot;
use profile_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use profile_bot::config::BotConfig;
use profile_bot::media::LocalMediaStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; keep HTTP client chatter out of the log by default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().context("loading configuration")?;

    eprintln!("🤖 Profile Bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Media ───────────────────────────────────────────────────────────
    let media = LocalMediaStore::new(config.media_dir.clone());
    media
        .ensure_dirs()
        .await
        .with_context(|| format!("creating media dir {}", config.media_dir.display()))?;
    eprintln!("   Media: {}", config.media_dir.display());
    eprintln!(
        "   Unmatched input: {}",
        if config.reprompt_unmatched { "re-prompt" } else { "ignore" }
    );

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();

    if let Some(ref telegram) = config.telegram {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if telegram.allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                telegram.allowed_users.join(", ")
            }
        );
        channels.add(Box::new(TelegramChannel::new(telegram.clone())));
    }

    if config.cli_enabled {
        channels.add(Box::new(CliChannel::new()));
    }

    eprintln!("   Channels: {}\n", channels.names().join(", "));

    let bot = Bot::new(&config, channels, Arc::new(media));
    bot.run().await?;

    Ok(())
}
