use super::*;

/// Resume the paused song
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn resume(ctx: Context<'_>) -> CommandResult {
    let (guild_id, invoker) = invoker(ctx)?;
    let outcome = ctx.data().music.resume(guild_id, &invoker).await;
    respond(ctx, outcome).await
}
