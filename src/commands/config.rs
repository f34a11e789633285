use std::time::Duration;

use crate::state::{Context, PipelineConfig};

/// Configure pipeline parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "max_prompt_chars | generation_timeout_secs | parallel_fetch"] param: Option<String>,
    #[description = "New value (parallel_fetch: 0 or 1)"] value: Option<u32>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = ctx.data().pipeline_config.read().await;
            ctx.say(format!(
                "**Pipeline Configuration:**\n\
                 `max_prompt_chars`: {}\n\
                 `generation_timeout_secs`: {}\n\
                 `parallel_fetch`: {}",
                config.max_prompt_chars,
                config.generation_timeout.as_secs(),
                config.parallel_fetch
            ))
            .await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let mut config = ctx.data().pipeline_config.write().await;
            let reply = apply(&mut config, key, val);
            drop(config);
            ctx.say(reply).await?;
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/sinology config generation_timeout_secs 60`")
                .await?;
        }
    }

    Ok(())
}

fn apply(config: &mut PipelineConfig, key: &str, val: u32) -> String {
    match key {
        "max_prompt_chars" if val > 0 => {
            config.max_prompt_chars = val as usize;
            format!("`max_prompt_chars` set to {}", val)
        }
        "generation_timeout_secs" if val > 0 => {
            config.generation_timeout = Duration::from_secs(val as u64);
            format!("`generation_timeout_secs` set to {}", val)
        }
        "parallel_fetch" => {
            config.parallel_fetch = val != 0;
            format!("`parallel_fetch` set to {}", config.parallel_fetch)
        }
        "max_prompt_chars" | "generation_timeout_secs" => {
            format!("`{}` must be greater than 0", key)
        }
        _ => format!(
            "Unknown param `{}`. Valid: `max_prompt_chars`, `generation_timeout_secs`, `parallel_fetch`",
            key
        ),
    }
}
