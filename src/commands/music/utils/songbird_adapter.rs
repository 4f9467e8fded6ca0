//! Voice transport and audio output backed by songbird.

use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::error::JoinError;
use songbird::input::{AudioStream, Input, LiveInput};
use songbird::tracks::{Track as SongbirdTrack, TrackHandle};
use songbird::{Event, Songbird, TrackEvent};
use symphonia::core::io::{MediaSource, ReadOnlySource};
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::event_handlers::{TrackEndNotifier, TrackErrorNotifier};
use super::music_manager::{MusicError, MusicResult};
use super::playback_pipeline::AudioSource;
use super::player_session::{AudioOutput, PlaybackHandle, TrackEvents};
use super::track_cache::CACHE_EXTENSION;
use super::voice_connection::VoiceTransport;

pub struct SongbirdVoice {
    songbird: Arc<Songbird>,
}

impl SongbirdVoice {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }
}

/// Wrap a pipeline source as songbird input. Both branches carry the same Ogg/Opus
/// container, so the probe hint is fixed.
fn into_input(source: AudioSource) -> Input {
    let media: Box<dyn MediaSource> = match source {
        AudioSource::Cached(file) => Box::new(file),
        AudioSource::Live(stream) => Box::new(ReadOnlySource::new(stream)),
    };

    let mut hint = Hint::new();
    hint.with_extension(CACHE_EXTENSION);

    Input::Live(
        LiveInput::Raw(AudioStream {
            input: media,
            hint: Some(hint),
        }),
        None,
    )
}

fn control_error(e: impl std::fmt::Display) -> MusicError {
    MusicError::PlaybackError(e.to_string())
}

#[async_trait]
impl VoiceTransport for SongbirdVoice {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| MusicError::JoinError(e.to_string()))
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        match self.songbird.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(MusicError::JoinError(e.to_string())),
        }
    }

    async fn connected_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.songbird.get(guild_id)?;
        let call = call.lock().await;
        call.current_connection()?;
        call.current_channel()
            .map(|channel| ChannelId::new(channel.0.get()))
    }
}

#[async_trait]
impl AudioOutput for SongbirdVoice {
    async fn attach(
        &self,
        guild_id: GuildId,
        source: AudioSource,
        volume: f32,
        events: TrackEvents,
    ) -> MusicResult<Box<dyn PlaybackHandle>> {
        let call = self.songbird.get(guild_id).ok_or(MusicError::NotConnected)?;
        let input = into_input(source);

        let handle = {
            let mut call = call.lock().await;
            call.play_only(SongbirdTrack::from(input).volume(volume))
        };

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    events: events.clone(),
                },
            )
            .map_err(control_error)?;
        handle
            .add_event(Event::Track(TrackEvent::Error), TrackErrorNotifier { events })
            .map_err(control_error)?;

        info!("Attached track to call in guild {}", guild_id);
        Ok(Box::new(SongbirdPlayback(handle)))
    }
}

/// Control over a track playing in a songbird call.
pub struct SongbirdPlayback(TrackHandle);

impl PlaybackHandle for SongbirdPlayback {
    fn pause(&self) -> MusicResult<()> {
        self.0.pause().map_err(control_error)
    }

    fn resume(&self) -> MusicResult<()> {
        self.0.play().map_err(control_error)
    }

    fn stop(&self) -> MusicResult<()> {
        debug!("Stopping track {}", self.0.uuid());
        self.0.stop().map_err(control_error)
    }

    fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.0.set_volume(volume).map_err(control_error)
    }
}
