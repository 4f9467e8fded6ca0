use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::ChannelId;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use crate::commands::music::audio_sources::Track;

use super::music_manager::{CommandOutcome, MusicResult};
use super::playback_pipeline::{AudioOrigin, PlaybackPipeline};
use super::player_session::{AudioOutput, GuildSignal, TrackEvents};
use super::session_registry::GuildSession;

/// Posts playback notices to a text channel.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, channel_id: ChannelId, outcome: CommandOutcome);
}

/// Drives each guild from one track to the next.
pub struct PlaybackScheduler {
    pipeline: Arc<PlaybackPipeline>,
    output: Arc<dyn AudioOutput>,
    announcer: Arc<dyn Announcer>,
}

impl PlaybackScheduler {
    pub fn new(
        pipeline: Arc<PlaybackPipeline>,
        output: Arc<dyn AudioOutput>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        Self {
            pipeline,
            output,
            announcer,
        }
    }

    /// Per-guild driver loop. Runs until the session is removed from the registry.
    pub async fn drive(
        self: Arc<Self>,
        session: Arc<Mutex<GuildSession>>,
        mut signals: UnboundedReceiver<GuildSignal>,
    ) {
        while let Some(signal) = signals.recv().await {
            let mut session = session.lock().await;
            match signal {
                GuildSignal::Advance => {
                    self.play_next(&mut session).await;
                }
                GuildSignal::TrackEnded { generation } => {
                    session.player().on_track_end(generation);
                }
                GuildSignal::TrackErrored { generation, reason } => {
                    // A failed stream is reported with its cause on the next advance.
                    if session.player().on_track_error(generation, &reason)
                        && !session.has_stream_failure()
                    {
                        if let Some(track) = session.current_track() {
                            let notice = CommandOutcome::failure(format!(
                                "Playback of **{}** failed, moving on.",
                                track.title
                            ));
                            self.announce(&session, notice);
                        }
                    }
                }
            }
        }
    }

    /// Start the next queued track if the player is idle. Tracks that cannot be
    /// started are reported and dropped; returns the track that started, if any.
    pub async fn play_next(&self, session: &mut GuildSession) -> Option<Track> {
        if !session.is_idle() {
            debug!("Guild {} is busy; advance ignored", session.guild_id());
            return None;
        }

        if let Some(error) = session.take_stream_failure() {
            if let Some(track) = session.queue.drop_current() {
                warn!("Stream of '{}' failed mid-playback: {}", track.title, error);
                let notice = CommandOutcome::failure(format!(
                    "Playback of **{}** was cut short: {}",
                    track.title, error
                ));
                self.announce(session, notice);
            }
        }

        loop {
            let Some(track) = session.queue.advance(session.loop_mode) else {
                info!("Queue finished in guild {}", session.guild_id());
                session.replace_job(None);
                return None;
            };

            match self.start_track(session, &track).await {
                Ok(origin) => {
                    info!(
                        "Now playing '{}' in guild {} ({:?})",
                        track.title,
                        session.guild_id(),
                        origin
                    );
                    let notice = CommandOutcome::info(format!("Now playing: {}", track.describe()));
                    self.announce(session, notice);
                    return Some(track);
                }
                Err(e) => {
                    error!(
                        "Could not play '{}' in guild {}: {}",
                        track.title,
                        session.guild_id(),
                        e
                    );
                    session.replace_job(None);
                    session.queue.drop_current();
                    let notice =
                        CommandOutcome::failure(format!("Could not play **{}**: {}", track.title, e));
                    self.announce(session, notice);
                }
            }
        }
    }

    async fn start_track(
        &self,
        session: &mut GuildSession,
        track: &Track,
    ) -> MusicResult<AudioOrigin> {
        let resolved = self.pipeline.resolve(track).await?;
        session.replace_job(resolved.job);

        let volume = session.volume();
        session
            .player()
            .play(self.output.as_ref(), resolved.source, volume)
            .await?;
        Ok(resolved.origin)
    }

    /// Fire-and-forget so the session lock is not held across network I/O.
    fn announce(&self, session: &GuildSession, outcome: CommandOutcome) {
        let Some(channel_id) = session.announce_channel else {
            return;
        };
        let announcer = self.announcer.clone();
        tokio::spawn(async move {
            announcer.announce(channel_id, outcome).await;
        });
    }
}

/// Reports the natural end of a songbird track to the guild driver.
pub struct TrackEndNotifier {
    pub events: TrackEvents,
}

#[async_trait]
impl songbird::EventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &songbird::EventContext<'_>) -> Option<songbird::Event> {
        if let songbird::EventContext::Track(_) = ctx {
            debug!("Track generation {} ended", self.events.generation());
            self.events.finished();
        }
        None
    }
}

/// Reports a songbird playback error to the guild driver.
pub struct TrackErrorNotifier {
    pub events: TrackEvents,
}

#[async_trait]
impl songbird::EventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &songbird::EventContext<'_>) -> Option<songbird::Event> {
        if let songbird::EventContext::Track(tracks) = ctx {
            let reason = match tracks.first().map(|(state, _)| &state.playing) {
                Some(songbird::tracks::PlayMode::Errored(e)) => e.to_string(),
                Some(other) => format!("{:?}", other),
                None => "unknown playback error".to_string(),
            };
            self.events.errored(reason);
        }
        None
    }
}
