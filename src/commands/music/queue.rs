use super::*;

/// Show the current song and what comes next
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn queue(ctx: Context<'_>) -> CommandResult {
    let (guild_id, _) = invoker(ctx)?;
    let outcome = ctx.data().music.queue(guild_id).await;
    respond(ctx, outcome).await
}
