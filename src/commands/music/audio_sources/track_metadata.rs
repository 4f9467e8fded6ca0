//! Defines the `Track` struct, the unit of audio that moves through a guild's queue,
//! and the `Requester` attached to it.

use serenity::model::id::UserId;
use std::fmt;

use crate::commands::music::utils::track_cache::CacheId;

/// The user who asked for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
}

impl Requester {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One queued unit of audio. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// The playable page URL handed to the fetcher (e.g. a YouTube watch URL).
    pub source_url: String,
    /// The user who requested the track.
    pub requested_by: Requester,
    /// Display title.
    pub title: String,
}

impl Track {
    pub fn new(
        source_url: impl Into<String>,
        requested_by: Requester,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            requested_by,
            title: title.into(),
        }
    }

    /// The cache key for this track, derived from the video identifier in its URL.
    /// `None` when the URL carries no recognizable video id; such tracks are never cached.
    pub fn cache_id(&self) -> Option<CacheId> {
        CacheId::from_url(&self.source_url)
    }

    /// Markdown line used in queue listings and announcements.
    pub fn describe(&self) -> String {
        format!("**{}** (requested by {})", self.title, self.requested_by)
    }
}
