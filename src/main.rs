mod agents;
mod commands;
mod config;
mod error;
mod export;
mod llm;
mod paper;
mod pipeline;
mod react;
mod repair;
mod search;
mod sessions;
mod state;
#[cfg(test)]
mod testing;
mod text;

use std::collections::HashSet;
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info};

use config::{AnalysisConfig, AppConfig};
use llm::LlmClient;
use paper::HttpDocumentLoader;
use search::TavilyClient;
use sessions::{SessionRunner, SessionStore};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();
    let app_config = AppConfig::from_env();
    tracing_subscriber::fmt()
        .with_max_level(app_config.log_level)
        .init();

    let token = dotenv::var("DISCORD_TOKEN").expect("DISCORD_TOKEN required");
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init storage
    let store = Arc::new(SessionStore::new(&app_config.data_dir).await?);
    info!("Session store initialized at {:?}", app_config.data_dir);

    // Init collaborators
    let llm_client = LlmClient::from_env()?;
    info!(model = llm_client.model(), "LLM client initialized");
    let search = TavilyClient::from_env()?;
    let loader = HttpDocumentLoader::new()?;

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let config = Arc::new(RwLock::new(AnalysisConfig::from_env()));
    let runner = SessionRunner::new(
        store.clone(),
        Arc::new(llm_client),
        Arc::new(search),
        Arc::new(loader),
        config.clone(),
    );

    let app_state = AppState {
        store,
        runner,
        admin_ids,
        config,
    };

    let intents =
        serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::copilot()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting Research Copilot Discord bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
