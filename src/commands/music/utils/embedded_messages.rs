use std::sync::Arc;

use poise::{CreateReply, serenity_prelude as serenity};
use serenity::all::{CreateEmbed, CreateMessage, Http};
use serenity::async_trait;
use serenity::model::id::ChannelId;
use tracing::warn;

use super::event_handlers::Announcer;
use super::music_manager::{CommandOutcome, OutcomeKind};

/// Create an embed describing a command outcome
pub fn outcome_embed(outcome: &CommandOutcome) -> CreateEmbed {
    let (title, color) = match outcome.kind {
        OutcomeKind::Success => ("🎵 Music", 0x00ff00),
        OutcomeKind::Info => ("ℹ️ Music", 0x5865f2),
        OutcomeKind::Failure => ("❌ Error", 0xff0000),
    };

    CreateEmbed::new()
        .title(title)
        .description(outcome.message.clone())
        .color(color)
}

/// Reply to a command with its outcome. Failures are only shown to the invoker
/// when the command came in as a slash command.
pub fn outcome_reply(outcome: &CommandOutcome) -> CreateReply {
    CreateReply::default()
        .embed(outcome_embed(outcome))
        .ephemeral(outcome.kind == OutcomeKind::Failure)
}

/// Posts playback notices to a guild text channel.
pub struct SerenityAnnouncer {
    http: Arc<Http>,
}

impl SerenityAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for SerenityAnnouncer {
    async fn announce(&self, channel_id: ChannelId, outcome: CommandOutcome) {
        let message = CreateMessage::new().embed(outcome_embed(&outcome));
        if let Err(e) = channel_id.send_message(&self.http, message).await {
            warn!("Failed to post notice to channel {}: {}", channel_id, e);
        }
    }
}
