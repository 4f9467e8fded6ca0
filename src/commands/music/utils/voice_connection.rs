//! Voice connection lifecycle per guild.

use std::sync::Arc;
use std::time::Duration;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tracing::{debug, info, warn};

use super::music_manager::{MusicError, MusicResult};

/// The chat platform's voice gateway.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join `channel_id` and resolve once the connection is ready to carry audio.
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()>;
    async fn leave(&self, guild_id: GuildId) -> MusicResult<()>;
    /// The channel of the live connection, `None` when disconnected.
    async fn connected_channel(&self, guild_id: GuildId) -> Option<ChannelId>;
}

pub struct VoiceConnections {
    transport: Arc<dyn VoiceTransport>,
    connect_timeout: Duration,
}

impl VoiceConnections {
    pub fn new(transport: Arc<dyn VoiceTransport>, connect_timeout: Duration) -> Self {
        Self {
            transport,
            connect_timeout,
        }
    }

    /// Ensure the bot is connected in `guild_id`, reusing a live connection.
    ///
    /// A join that is not ready within the connect timeout fails with
    /// [`MusicError::ConnectTimeout`]; the half-open connection is torn down.
    pub async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<ChannelId> {
        if let Some(current) = self.transport.connected_channel(guild_id).await {
            debug!("Reusing voice connection to {} in guild {}", current, guild_id);
            return Ok(current);
        }

        info!("Joining voice channel {} in guild {}", channel_id, guild_id);
        let result = match tokio::time::timeout(
            self.connect_timeout,
            self.transport.join(guild_id, channel_id),
        )
        .await
        {
            Ok(joined) => joined,
            Err(_) => Err(MusicError::ConnectTimeout(self.connect_timeout)),
        };

        match result {
            Ok(()) => Ok(channel_id),
            Err(e) => {
                warn!("Voice connection in guild {} failed: {}", guild_id, e);
                if let Err(leave_err) = self.transport.leave(guild_id).await {
                    debug!("Cleanup after failed join: {}", leave_err);
                }
                Err(e)
            }
        }
    }

    /// Whether a user in `user_channel` may control playback. Without a connection
    /// anyone may.
    pub async fn is_same_channel(&self, guild_id: GuildId, user_channel: Option<ChannelId>) -> bool {
        match self.transport.connected_channel(guild_id).await {
            None => true,
            Some(bot_channel) => user_channel == Some(bot_channel),
        }
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.transport.connected_channel(guild_id).await.is_some()
    }

    pub async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        self.transport.leave(guild_id).await
    }
}
