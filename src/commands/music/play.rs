use super::*;
use tracing::info;

/// Play a song from YouTube: a video URL, a playlist URL or search terms
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn play(
    ctx: Context<'_>,
    #[description = "URL or search query"]
    #[rest]
    query: Option<String>,
) -> CommandResult {
    info!("Received play command with query: {:?}", query);
    let (guild_id, invoker) = invoker(ctx)?;

    // Resolving and joining can take a while
    ctx.defer().await?;

    let outcome = ctx
        .data()
        .music
        .enqueue_from_query(guild_id, &invoker, query.as_deref())
        .await;
    respond(ctx, outcome).await
}
