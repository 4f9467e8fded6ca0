use super::*;

/// Skip the current song
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn skip(ctx: Context<'_>) -> CommandResult {
    let (guild_id, invoker) = invoker(ctx)?;
    let outcome = ctx.data().music.skip(guild_id, &invoker).await;
    respond(ctx, outcome).await
}
