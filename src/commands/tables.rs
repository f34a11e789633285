use crate::commands::send_chunked;
use crate::state::Context;

/// List the tables available for analysis
#[poise::command(slash_command, guild_only)]
pub async fn tables(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let tables = &ctx.data().tables;

    if tables.is_empty() {
        ctx.say("No tables configured. Set `SINOLOGY_TABLES` and restart.")
            .await?;
        return Ok(());
    }

    let mut output = String::from("**Available tables**\n\n");
    for table in tables {
        output.push_str(&format!("- `{}`\n", table));
    }
    output.push_str("\nPass several to `/sinology analyze` separated by commas.");

    send_chunked(&ctx, &output).await
}
