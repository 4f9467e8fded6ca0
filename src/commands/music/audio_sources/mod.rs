//! This module defines the track model and the interface for turning a user query
//! into tracks. The YouTube implementation lives in [`youtube`].

/// Submodule defining the `Track` struct used across the music core.
pub mod track_metadata;
/// Submodule implementing the `SourceResolver` trait for YouTube.
pub mod youtube;

use serenity::async_trait;

use crate::commands::music::utils::music_manager::MusicResult;

pub use track_metadata::{Requester, Track};

/// What a query resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Single(Track),
    Playlist(Vec<Track>),
}

/// Turns free text or a URL into one or more playable tracks.
///
/// Implementations return [`MusicError::NotFound`](crate::commands::music::utils::music_manager::MusicError::NotFound)
/// with a user-facing message when nothing matches.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, query: &str, requester: &Requester) -> MusicResult<Resolved>;
}
