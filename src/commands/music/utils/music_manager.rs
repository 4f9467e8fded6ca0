use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commands::music::audio_sources::{Requester, Resolved, SourceResolver, Track};

use super::player_session::Transition;
use super::queue_manager::LoopMode;
use super::session_registry::SessionRegistry;
use super::voice_connection::VoiceConnections;

const SAME_CHANNEL_REQUIRED: &str =
    "You need to be in the same voice channel as the bot to use this command.";
const NOTHING_PLAYING: &str = "No song is currently playing.";

/// Errors that can occur during music operations
#[derive(Error, Debug, Clone)]
pub enum MusicError {
    #[error("Not in a guild")]
    NotInGuild,

    #[error("Failed to join voice channel: {0}")]
    JoinError(String),

    #[error("Voice connection was not ready within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("User is not in a voice channel")]
    UserNotInVoiceChannel,

    #[error("Failed to fetch audio: {0}")]
    FetchFailed(String),

    #[error("Failed to transcode audio: {0}")]
    TranscodeFailed(String),

    #[error("Failed to write cache entry: {0}")]
    CacheWriteFailed(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidCommandArgument(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),
}

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    /// Nothing went wrong, but nothing happened either.
    Info,
    Failure,
}

/// The single reply every music command produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub kind: OutcomeKind,
    pub message: String,
}

impl CommandOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Info,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            message: message.into(),
        }
    }
}

impl From<MusicError> for CommandOutcome {
    fn from(error: MusicError) -> Self {
        match error {
            MusicError::NotFound(message) | MusicError::InvalidCommandArgument(message) => {
                Self::failure(message)
            }
            MusicError::JoinError(_) | MusicError::ConnectTimeout(_) => {
                Self::failure("Failed to join the voice channel.")
            }
            MusicError::NotConnected => Self::info("I am not in a voice channel."),
            MusicError::UserNotInVoiceChannel => {
                Self::failure("You need to be in a voice channel to play music!")
            }
            MusicError::NotInGuild => Self::failure("This command can only be used in a server."),
            other => Self::failure(other.to_string()),
        }
    }
}

/// Who issued a command, and from where.
#[derive(Debug, Clone)]
pub struct Invoker {
    pub user: Requester,
    /// The voice channel the user is sitting in, if any.
    pub voice_channel: Option<ChannelId>,
    /// Where the command was typed; playback notices go there.
    pub text_channel: ChannelId,
}

/// Snapshot of a guild's queue for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueListing {
    pub now_playing: Option<Track>,
    /// Pending tracks with their 1-based positions, truncated to the display limit.
    pub upcoming: Vec<(usize, Track)>,
    /// Pending tracks beyond the display limit.
    pub hidden: usize,
    pub loop_mode: LoopMode,
}

impl QueueListing {
    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none() && self.upcoming.is_empty() && self.hidden == 0
    }

    pub fn render(&self) -> String {
        if self.is_empty() {
            return "The queue is empty.".to_string();
        }

        let now_playing = self
            .now_playing
            .as_ref()
            .map(Track::describe)
            .unwrap_or_else(|| "Nothing".to_string());

        let mut out = format!("__Now Playing__\n\n{}\n\n__Queue:__\n\n", now_playing);
        let lines: Vec<String> = self
            .upcoming
            .iter()
            .map(|(position, track)| format!("{}. {}", position, track.describe()))
            .collect();
        out.push_str(&lines.join("\n"));
        if self.hidden > 0 {
            out.push_str(&format!("\n...and {} more", self.hidden));
        }
        out.push_str(&format!("\n\n__Loop Mode:__ {}", self.loop_mode));
        out
    }
}

/// Parse a `volume` argument into a percentage in `0..=100`.
pub fn parse_volume_percent(raw: Option<&str>) -> MusicResult<u8> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty()).ok_or_else(|| {
        MusicError::InvalidCommandArgument(
            "Please provide a volume level between 0 and 100.".to_string(),
        )
    })?;

    match raw.parse::<i64>() {
        Ok(percent @ 0..=100) => Ok(percent as u8),
        _ => Err(MusicError::InvalidCommandArgument(
            "Volume must be a number between 0 and 100.".to_string(),
        )),
    }
}

/// Per-guild command façade. Every operation returns a [`CommandOutcome`]; errors
/// never escape to the gateway layer.
pub struct MusicManager {
    registry: Arc<SessionRegistry>,
    connections: VoiceConnections,
    resolver: Arc<dyn SourceResolver>,
    queue_display_limit: usize,
}

impl MusicManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        connections: VoiceConnections,
        resolver: Arc<dyn SourceResolver>,
        queue_display_limit: usize,
    ) -> Self {
        Self {
            registry,
            connections,
            resolver,
            queue_display_limit,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Refuses the command when the bot sits in a voice channel other than the user's.
    async fn gate(&self, guild_id: GuildId, invoker: &Invoker) -> Option<CommandOutcome> {
        if self
            .connections
            .is_same_channel(guild_id, invoker.voice_channel)
            .await
        {
            None
        } else {
            debug!(
                "Refusing command from {} in guild {}: not in the bot's channel",
                invoker.user, guild_id
            );
            Some(CommandOutcome::failure(SAME_CHANNEL_REQUIRED))
        }
    }

    /// Resolve `query`, join the invoker's channel if needed, enqueue the result and
    /// start playback when the guild is idle.
    pub async fn enqueue_from_query(
        &self,
        guild_id: GuildId,
        invoker: &Invoker,
        query: Option<&str>,
    ) -> CommandOutcome {
        if let Some(refusal) = self.gate(guild_id, invoker).await {
            return refusal;
        }

        let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            return CommandOutcome::failure("Please provide a URL or search terms to play!");
        };
        let Some(voice_channel) = invoker.voice_channel else {
            return MusicError::UserNotInVoiceChannel.into();
        };

        if let Err(e) = self.connections.connect(guild_id, voice_channel).await {
            warn!("Could not join {} in guild {}: {}", voice_channel, guild_id, e);
            return e.into();
        }

        let resolved = match self.resolver.resolve(query, &invoker.user).await {
            Ok(resolved) => resolved,
            Err(e) => {
                info!("Nothing to enqueue for '{}': {}", query, e);
                return e.into();
            }
        };

        let session = self.registry.get_or_create(guild_id);
        let mut session = session.lock().await;
        session.announce_channel = Some(invoker.text_channel);

        let outcome = match resolved {
            Resolved::Single(track) => {
                let message = format!("Added to queue: **{}**", track.title);
                let position = session.queue.enqueue(track);
                debug!("Enqueued at position {} in guild {}", position, guild_id);
                CommandOutcome::success(message)
            }
            Resolved::Playlist(tracks) if tracks.is_empty() => {
                return CommandOutcome::failure("No videos found in the playlist.");
            }
            Resolved::Playlist(tracks) => {
                let added = session.queue.enqueue_many(tracks);
                CommandOutcome::success(format!(
                    "Added {} songs from the playlist to the queue.",
                    added
                ))
            }
        };

        if session.is_idle() {
            session.request_advance();
        }
        outcome
    }

    /// Stop the current track; the queue advances on its own.
    pub async fn skip(&self, guild_id: GuildId, invoker: &Invoker) -> CommandOutcome {
        if let Some(refusal) = self.gate(guild_id, invoker).await {
            return refusal;
        }
        let Some(session) = self.registry.get(guild_id) else {
            return CommandOutcome::info(NOTHING_PLAYING);
        };

        match session.lock().await.skip() {
            Transition::Changed(_) => CommandOutcome::success("Skipped the current song."),
            Transition::NothingToDo => CommandOutcome::info(NOTHING_PLAYING),
        }
    }

    pub async fn pause(&self, guild_id: GuildId, invoker: &Invoker) -> CommandOutcome {
        if let Some(refusal) = self.gate(guild_id, invoker).await {
            return refusal;
        }
        let Some(session) = self.registry.get(guild_id) else {
            return CommandOutcome::info(NOTHING_PLAYING);
        };

        let mut session = session.lock().await;
        match session.player().pause() {
            Ok(Transition::Changed(_)) => CommandOutcome::success("Paused the current song."),
            Ok(Transition::NothingToDo) => CommandOutcome::info(NOTHING_PLAYING),
            Err(e) => e.into(),
        }
    }

    pub async fn resume(&self, guild_id: GuildId, invoker: &Invoker) -> CommandOutcome {
        if let Some(refusal) = self.gate(guild_id, invoker).await {
            return refusal;
        }
        let nothing_paused = CommandOutcome::info("No song is currently paused.");
        let Some(session) = self.registry.get(guild_id) else {
            return nothing_paused;
        };

        let mut session = session.lock().await;
        match session.player().resume() {
            Ok(Transition::Changed(_)) => CommandOutcome::success("Resumed the current song."),
            Ok(Transition::NothingToDo) => nothing_paused,
            Err(e) => e.into(),
        }
    }

    /// Set the guild volume from a raw `0..=100` argument. Applies to the current
    /// track and every later one.
    pub async fn set_volume_percent(
        &self,
        guild_id: GuildId,
        invoker: &Invoker,
        raw: Option<&str>,
    ) -> CommandOutcome {
        if let Some(refusal) = self.gate(guild_id, invoker).await {
            return refusal;
        }
        let percent = match parse_volume_percent(raw) {
            Ok(percent) => percent,
            Err(e) => return e.into(),
        };

        let session = self.registry.get_or_create(guild_id);
        if let Err(e) = session.lock().await.set_volume(f32::from(percent) / 100.0) {
            warn!("Volume change not applied to the current track: {}", e);
        }
        CommandOutcome::success(format!("Volume set to {}%.", percent))
    }

    pub async fn set_loop_mode(
        &self,
        guild_id: GuildId,
        invoker: &Invoker,
        raw: Option<&str>,
    ) -> CommandOutcome {
        if let Some(refusal) = self.gate(guild_id, invoker).await {
            return refusal;
        }
        let mode = match raw.unwrap_or_default().parse::<LoopMode>() {
            Ok(mode) => mode,
            Err(e) => return e.into(),
        };

        let session = self.registry.get_or_create(guild_id);
        session.lock().await.loop_mode = mode;
        info!("Loop mode for guild {} is now {}", guild_id, mode);
        CommandOutcome::success(format!("Loop mode set to {}.", mode))
    }

    /// The current track plus the first pending tracks, with 1-based positions.
    pub async fn list_queue(&self, guild_id: GuildId) -> QueueListing {
        let Some(session) = self.registry.get(guild_id) else {
            return QueueListing {
                now_playing: None,
                upcoming: Vec::new(),
                hidden: 0,
                loop_mode: LoopMode::default(),
            };
        };

        let session = session.lock().await;
        let pending = session.queue.peek_all();
        let upcoming = pending
            .iter()
            .take(self.queue_display_limit)
            .enumerate()
            .map(|(index, track)| (index + 1, (*track).clone()))
            .collect::<Vec<_>>();

        QueueListing {
            now_playing: session.queue.current().cloned(),
            hidden: pending.len() - upcoming.len(),
            upcoming,
            loop_mode: session.loop_mode,
        }
    }

    pub async fn queue(&self, guild_id: GuildId) -> CommandOutcome {
        CommandOutcome::info(self.list_queue(guild_id).await.render())
    }

    pub async fn leave(&self, guild_id: GuildId, invoker: &Invoker) -> CommandOutcome {
        if let Some(refusal) = self.gate(guild_id, invoker).await {
            return refusal;
        }

        match self.disconnect(guild_id).await {
            Ok(()) => CommandOutcome::success("Left the voice channel."),
            Err(e) => e.into(),
        }
    }

    /// Terminal teardown of a guild: player, queue, settings and voice connection.
    ///
    /// The session is released even when the voice connection is already gone (the
    /// bot was kicked or dropped); that case still reports `NotConnected`.
    pub async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        let connected = self.connections.is_connected(guild_id).await;
        if self.registry.remove(guild_id).await && !connected {
            info!("Released session of guild {} without a voice connection", guild_id);
        }
        if !connected {
            return Err(MusicError::NotConnected);
        }

        self.connections.disconnect(guild_id).await?;
        info!("Left voice in guild {}", guild_id);
        Ok(())
    }
}
