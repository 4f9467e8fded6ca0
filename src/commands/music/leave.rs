use super::*;

/// Leave the voice channel and clear the queue
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn leave(ctx: Context<'_>) -> CommandResult {
    let (guild_id, invoker) = invoker(ctx)?;
    let outcome = ctx.data().music.leave(guild_id, &invoker).await;
    respond(ctx, outcome).await
}
