//! Chat commands for the guild music queue.

pub mod leave;
pub mod loop_mode;
pub mod pause;
pub mod play;
pub mod queue;
pub mod resume;
pub mod skip;
pub mod volume;

pub mod audio_sources;
pub mod utils;

use poise::serenity_prelude as serenity;
use serenity::model::id::GuildId;
use tracing::debug;

use crate::{CommandResult, Context};
use audio_sources::Requester;
use utils::embedded_messages::outcome_reply;
use utils::music_manager::{CommandOutcome, Invoker, MusicError};

/// The guild a command was issued in, and who issued it from which voice channel.
fn invoker(ctx: Context<'_>) -> Result<(GuildId, Invoker), MusicError> {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;
    let author = ctx.author();
    let voice_channel = ctx.guild().and_then(|guild| {
        guild
            .voice_states
            .get(&author.id)
            .and_then(|state| state.channel_id)
    });

    Ok((
        guild_id,
        Invoker {
            user: Requester::new(author.id, author.name.clone()),
            voice_channel,
            text_channel: ctx.channel_id(),
        },
    ))
}

/// Send the single reply of a music command.
async fn respond(ctx: Context<'_>, outcome: CommandOutcome) -> CommandResult {
    debug!(
        "{} -> {:?}: {}",
        ctx.command().qualified_name,
        outcome.kind,
        outcome.message
    );
    ctx.send(outcome_reply(&outcome)).await?;
    Ok(())
}
