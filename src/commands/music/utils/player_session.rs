//! Per-guild audio player state machine.
//!
//! ```text
//! Idle --play--> Buffering --attached--> Playing <--pause/resume--> Paused
//!  ^                 |                      |                          |
//!  +---attach failed-+----stop / ended / error---------------------------+
//! ```
//!
//! Entering `Idle` from a playing state pushes [`GuildSignal::Advance`] to the guild's
//! driver, which pulls the next track from the queue.

use serenity::async_trait;
use serenity::model::id::GuildId;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::music_manager::{MusicError, MusicResult};
use super::playback_pipeline::AudioSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    /// A source is being attached to the output.
    Buffering,
    Playing,
    Paused,
}

/// Messages consumed by a guild's playback driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuildSignal {
    /// The player went idle; play the next queued track if there is one.
    Advance,
    /// The output finished the track attached as `generation`.
    TrackEnded { generation: u64 },
    /// The output gave up on the track attached as `generation`.
    TrackErrored { generation: u64, reason: String },
}

/// Lets an output report the fate of one attached track back to the driver.
#[derive(Debug, Clone)]
pub struct TrackEvents {
    generation: u64,
    signals: UnboundedSender<GuildSignal>,
}

impl TrackEvents {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn finished(&self) {
        let _ = self.signals.send(GuildSignal::TrackEnded {
            generation: self.generation,
        });
    }

    pub fn errored(&self, reason: impl Into<String>) {
        let _ = self.signals.send(GuildSignal::TrackErrored {
            generation: self.generation,
            reason: reason.into(),
        });
    }
}

/// Control over one attached track.
pub trait PlaybackHandle: Send + Sync {
    fn pause(&self) -> MusicResult<()>;
    fn resume(&self) -> MusicResult<()>;
    fn stop(&self) -> MusicResult<()>;
    fn set_volume(&self, volume: f32) -> MusicResult<()>;
}

/// The live audio output of a guild (the voice call).
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Start playing `source` at `volume`. The output must call
    /// [`TrackEvents::finished`] once the source is exhausted.
    async fn attach(
        &self,
        guild_id: GuildId,
        source: AudioSource,
        volume: f32,
        events: TrackEvents,
    ) -> MusicResult<Box<dyn PlaybackHandle>>;
}

/// Result of a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed(PlayerState),
    /// The command has no meaning in the current state.
    NothingToDo,
}

pub struct PlayerSession {
    guild_id: GuildId,
    state: PlayerState,
    generation: u64,
    handle: Option<Box<dyn PlaybackHandle>>,
    signals: UnboundedSender<GuildSignal>,
}

impl PlayerSession {
    pub fn new(guild_id: GuildId, signals: UnboundedSender<GuildSignal>) -> Self {
        Self {
            guild_id,
            state: PlayerState::Idle,
            generation: 0,
            handle: None,
            signals,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == PlayerState::Idle
    }

    /// Generation of the most recently attached track.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Attach `source` and start playing at `volume`.
    ///
    /// Only valid while idle. A failed attach returns to `Idle` without signalling;
    /// the caller decides how to move on.
    pub async fn play(
        &mut self,
        output: &dyn AudioOutput,
        source: AudioSource,
        volume: f32,
    ) -> MusicResult<()> {
        if self.state != PlayerState::Idle {
            return Err(MusicError::PlaybackError(format!(
                "cannot start a track while {:?}",
                self.state
            )));
        }

        self.generation += 1;
        self.state = PlayerState::Buffering;
        let events = TrackEvents {
            generation: self.generation,
            signals: self.signals.clone(),
        };

        match output.attach(self.guild_id, source, volume, events).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = PlayerState::Playing;
                debug!(
                    "Guild {} playing generation {} at volume {:.2}",
                    self.guild_id, self.generation, volume
                );
                Ok(())
            }
            Err(e) => {
                self.state = PlayerState::Idle;
                Err(e)
            }
        }
    }

    pub fn pause(&mut self) -> MusicResult<Transition> {
        if self.state != PlayerState::Playing {
            return Ok(Transition::NothingToDo);
        }
        if let Some(handle) = &self.handle {
            handle.pause()?;
        }
        self.state = PlayerState::Paused;
        Ok(Transition::Changed(self.state))
    }

    pub fn resume(&mut self) -> MusicResult<Transition> {
        if self.state != PlayerState::Paused {
            return Ok(Transition::NothingToDo);
        }
        if let Some(handle) = &self.handle {
            handle.resume()?;
        }
        self.state = PlayerState::Playing;
        Ok(Transition::Changed(self.state))
    }

    /// Stop the current track (skip). Triggers an advance.
    pub fn stop(&mut self) -> Transition {
        if self.state == PlayerState::Idle {
            return Transition::NothingToDo;
        }
        self.release_handle();
        self.enter_idle();
        Transition::Changed(PlayerState::Idle)
    }

    /// Stop without asking for the next track (teardown).
    pub fn halt(&mut self) {
        self.release_handle();
        self.state = PlayerState::Idle;
    }

    /// Apply `volume` to the attached track, if any.
    pub fn set_volume(&mut self, volume: f32) -> MusicResult<()> {
        match &self.handle {
            Some(handle) => handle.set_volume(volume),
            None => Ok(()),
        }
    }

    /// The output exhausted the track of `generation`. Returns whether the event was
    /// current; events for replaced or stopped tracks are ignored.
    pub fn on_track_end(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            debug!(
                "Ignoring stale end event (generation {}, current {})",
                generation, self.generation
            );
            return false;
        }
        info!("Track finished in guild {}", self.guild_id);
        self.handle = None;
        self.enter_idle();
        true
    }

    /// The output failed while playing the track of `generation`. Handled like an end.
    pub fn on_track_error(&mut self, generation: u64, reason: &str) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        error!("Playback error in guild {}: {}", self.guild_id, reason);
        self.handle = None;
        self.enter_idle();
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state != PlayerState::Idle
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.stop() {
                warn!("Failed to stop track in guild {}: {}", self.guild_id, e);
            }
        }
    }

    fn enter_idle(&mut self) {
        let previous = std::mem::replace(&mut self.state, PlayerState::Idle);
        if previous != PlayerState::Idle {
            let _ = self.signals.send(GuildSignal::Advance);
        }
    }
}
