//! Process-wide map from guild to its [`GuildSession`].
//!
//! Every session gets one driver task that drains the guild's [`GuildSignal`]s, so
//! auto-advance is serialized with commands through the session mutex.

use std::sync::Arc;

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::commands::music::audio_sources::Track;

use super::event_handlers::PlaybackScheduler;
use super::music_manager::{MusicError, MusicResult};
use super::playback_pipeline::PlaybackJob;
use super::player_session::{GuildSignal, PlayerSession, PlayerState, Transition};
use super::queue_manager::{LoopMode, TrackQueue};

/// Everything one guild's voice session owns.
pub struct GuildSession {
    guild_id: GuildId,
    pub queue: TrackQueue,
    pub loop_mode: LoopMode,
    volume: f32,
    player: Option<PlayerSession>,
    active_job: Option<PlaybackJob>,
    /// Text channel for playback notices (the channel of the latest `play`).
    pub announce_channel: Option<ChannelId>,
    signals: UnboundedSender<GuildSignal>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, signals: UnboundedSender<GuildSignal>) -> Self {
        Self {
            guild_id,
            queue: TrackQueue::new(),
            loop_mode: LoopMode::default(),
            volume: 1.0,
            player: None,
            active_job: None,
            announce_channel: None,
            signals,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// The player, created on first use.
    pub fn player(&mut self) -> &mut PlayerSession {
        let guild_id = self.guild_id;
        let signals = &self.signals;
        self.player
            .get_or_insert_with(|| PlayerSession::new(guild_id, signals.clone()))
    }

    pub fn player_state(&self) -> PlayerState {
        self.player
            .as_ref()
            .map_or(PlayerState::Idle, PlayerSession::state)
    }

    pub fn is_idle(&self) -> bool {
        self.player_state() == PlayerState::Idle
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.queue.current()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Remember `volume` for later tracks and apply it to the attached one.
    pub fn set_volume(&mut self, volume: f32) -> MusicResult<()> {
        self.volume = volume.clamp(0.0, 1.0);
        match &mut self.player {
            Some(player) => player.set_volume(self.volume),
            None => Ok(()),
        }
    }

    /// Track the fetch/transcode feeding the current track. Replacing a job
    /// interrupts it.
    pub fn replace_job(&mut self, job: Option<PlaybackJob>) {
        self.active_job = job;
    }

    pub fn has_active_job(&self) -> bool {
        self.active_job.as_ref().is_some_and(|job| !job.is_finished())
    }

    pub fn has_stream_failure(&self) -> bool {
        self.active_job
            .as_ref()
            .is_some_and(|job| job.failure().is_some())
    }

    /// The error that cut the current track's stream short, if any. The failed job
    /// is released so the failure is reported once.
    pub fn take_stream_failure(&mut self) -> Option<MusicError> {
        let error = self.active_job.as_ref()?.failure()?.clone();
        self.replace_job(None);
        Some(error)
    }

    /// Stop the current track and interrupt its stream; the driver then advances.
    pub fn skip(&mut self) -> Transition {
        let transition = match &mut self.player {
            Some(player) => player.stop(),
            None => Transition::NothingToDo,
        };
        if transition != Transition::NothingToDo {
            self.replace_job(None);
        }
        transition
    }

    /// Ask the driver to play the next queued track.
    pub fn request_advance(&self) {
        let _ = self.signals.send(GuildSignal::Advance);
    }

    /// Release player, stream and queue.
    pub fn teardown(&mut self) {
        if self.has_active_job() {
            debug!("Interrupting the stream of guild {}", self.guild_id);
        }
        if let Some(player) = &mut self.player {
            player.halt();
        }
        self.player = None;
        self.active_job = None;
        self.queue.clear();
    }
}

struct GuildHandle {
    session: Arc<Mutex<GuildSession>>,
    driver: JoinHandle<()>,
}

impl Drop for GuildHandle {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Owns all guild sessions. Distinct guilds never contend beyond the map itself.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, GuildHandle>,
    scheduler: Arc<PlaybackScheduler>,
}

impl SessionRegistry {
    pub fn new(scheduler: Arc<PlaybackScheduler>) -> Self {
        Self {
            sessions: DashMap::new(),
            scheduler,
        }
    }

    /// The guild's session, created (with its driver) on first use.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Mutex<GuildSession>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Creating session for guild {}", guild_id);
                let (tx, rx) = mpsc::unbounded_channel();
                let session = Arc::new(Mutex::new(GuildSession::new(guild_id, tx)));
                let driver = tokio::spawn(self.scheduler.clone().drive(session.clone(), rx));
                GuildHandle { session, driver }
            })
            .session
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildSession>>> {
        self.sessions
            .get(&guild_id)
            .map(|handle| handle.session.clone())
    }

    /// Destroy the guild's session: the driver stops and everything it owned is
    /// released. Returns whether a session existed.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, handle)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        handle.driver.abort();
        handle.session.lock().await.teardown();
        info!(
            "Session for guild {} removed, {} remaining",
            guild_id,
            self.len()
        );
        if self.is_empty() {
            debug!("No guild sessions left");
        }
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
