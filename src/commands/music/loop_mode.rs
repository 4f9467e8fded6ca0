use super::*;

/// Set the loop mode: off, song or queue
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "loop",
    category = "Music"
)]
pub async fn loop_mode(
    ctx: Context<'_>,
    #[description = "off, song or queue"] mode: Option<String>,
) -> CommandResult {
    let (guild_id, invoker) = invoker(ctx)?;
    let outcome = ctx
        .data()
        .music
        .set_loop_mode(guild_id, &invoker, mode.as_deref())
        .await;
    respond(ctx, outcome).await
}
