use super::*;

/// Set the playback volume (0-100)
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn volume(
    ctx: Context<'_>,
    #[description = "Volume level between 0 and 100"] level: Option<String>,
) -> CommandResult {
    let (guild_id, invoker) = invoker(ctx)?;
    let outcome = ctx
        .data()
        .music
        .set_volume_percent(guild_id, &invoker, level.as_deref())
        .await;
    respond(ctx, outcome).await
}
