mod commands;
mod error;
mod llm;
mod research;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, Level};

use llm::GeminiClient;
use research::ResearchEngine;
use state::{AppState, PipelineConfig};
use store::SupabaseSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init table source and model client; missing secrets are fatal here
    let source = Arc::new(SupabaseSource::from_env()?);
    info!("Table source initialized");

    let llm_client = Arc::new(GeminiClient::from_env()?);
    info!(model = llm_client.model(), "LLM client initialized");

    let tables = parse_table_list(
        &dotenv::var("SINOLOGY_TABLES").unwrap_or_else(|_| "textos_clasicos".to_string()),
    );
    info!(tables = ?tables, "Tables configured");

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let pipeline_config = PipelineConfig::from_env();
    info!(config = ?pipeline_config, "Pipeline configured");

    let app_state = AppState {
        engine: Arc::new(ResearchEngine::new(source, llm_client)),
        tables,
        admin_ids,
        pipeline_config: Arc::new(RwLock::new(pipeline_config)),
    };

    let intents = serenity::GatewayIntents::GUILDS;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::sinology()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!(user = %ready.user.name, id = %ready.user.id, "Connected to Discord");
                register_commands(ctx, &framework.options().commands, guild_id).await?;
                Ok(app_state)
            })
        })
        .build();

    info!("Starting sinology research bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}

type Command = poise::Command<AppState, anyhow::Error>;

/// Slash paths (`sinology analyze`, ...) for the startup log.
fn command_paths(commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .flat_map(|cmd| {
            std::iter::once(cmd.name.clone()).chain(
                cmd.subcommands
                    .iter()
                    .map(move |sub| format!("{} {}", cmd.name, sub.name)),
            )
        })
        .collect()
}

/// Guild registration is instant; global registration can take up to an hour to show.
async fn register_commands(
    ctx: &serenity::Context,
    commands: &[Command],
    guild_id: Option<serenity::GuildId>,
) -> Result<(), serenity::Error> {
    let paths = command_paths(commands);
    match guild_id {
        Some(gid) => {
            info!(guild = %gid, commands = ?paths, "Registering slash commands in guild");
            poise::builtins::register_in_guild(ctx, commands, gid).await
        }
        None => {
            info!(commands = ?paths, "Registering slash commands globally");
            poise::builtins::register_globally(ctx, commands).await
        }
    }
}

/// Comma-separated table names, blanks and repeats dropped.
fn parse_table_list(raw: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !tables.iter().any(|t| t == name) {
            tables.push(name.to_string());
        }
    }
    tables
}
