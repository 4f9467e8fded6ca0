use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::music_manager::MusicError;
use crate::commands::music::audio_sources::Track;

/// What happens to a track once it finishes playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Finished tracks are discarded.
    #[default]
    Off,
    /// The finished track goes back to the front and plays again.
    Song,
    /// The finished track goes to the back of the queue.
    Queue,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Song => "song",
            LoopMode::Queue => "queue",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "song" => Ok(LoopMode::Song),
            "queue" => Ok(LoopMode::Queue),
            _ => Err(MusicError::InvalidCommandArgument(
                "Please specify a loop mode: off, song, or queue.".to_string(),
            )),
        }
    }
}

/// Pending tracks of one guild plus the track currently playing.
///
/// The current track is never also present in the pending list: it is popped out of
/// the list when it starts and only re-inserted (per [`LoopMode`]) on the next advance.
#[derive(Debug, Default)]
pub struct TrackQueue {
    pending: VecDeque<Track>,
    current: Option<Track>,
}

impl TrackQueue {
    /// Create a new, empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track to the back of the queue. Returns its 1-based position.
    pub fn enqueue(&mut self, track: Track) -> usize {
        self.pending.push_back(track);
        self.pending.len()
    }

    /// Add several tracks in order (playlist expansion). Returns how many were added.
    pub fn enqueue_many(&mut self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let before = self.pending.len();
        self.pending.extend(tracks);
        self.pending.len() - before
    }

    /// Finish the current track and pop the next one.
    ///
    /// The finished track is first re-inserted according to `loop_mode`, so `Song`
    /// replays it and `Queue` cycles through everything. Returns `None` once nothing
    /// is left.
    pub fn advance(&mut self, loop_mode: LoopMode) -> Option<Track> {
        if let Some(finished) = self.current.take() {
            match loop_mode {
                LoopMode::Off => {}
                LoopMode::Song => self.pending.push_front(finished),
                LoopMode::Queue => self.pending.push_back(finished),
            }
        }

        self.current = self.pending.pop_front();
        if let Some(track) = &self.current {
            debug!("Advanced queue to '{}'", track.title);
        }
        self.current.clone()
    }

    /// Forget the current track without re-inserting it.
    pub fn drop_current(&mut self) -> Option<Track> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    /// Pending tracks in play order (the current track excluded).
    pub fn peek_all(&self) -> Vec<&Track> {
        self.pending.iter().collect()
    }

    /// Remove every pending track and the current one.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
    }

    /// Number of pending tracks
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
