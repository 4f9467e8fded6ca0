//! Test fixtures: ids, tracks and invokers used across the music suites.

use serenity::model::id::{ChannelId, GuildId, UserId};

use encore::commands::music::audio_sources::{Requester, Resolved, Track};
use encore::commands::music::utils::music_manager::{Invoker, MusicError, MusicResult};

/// Bytes standing in for transcoded Ogg/Opus audio.
pub const SAMPLE_AUDIO: &[u8] = b"OggS\x00\x02 fake opus pages for the test suite, long enough to chunk";

pub fn guild() -> GuildId {
    GuildId::new(100)
}

pub fn other_guild() -> GuildId {
    GuildId::new(200)
}

pub fn voice_channel() -> ChannelId {
    ChannelId::new(10)
}

pub fn other_voice_channel() -> ChannelId {
    ChannelId::new(11)
}

pub fn text_channel() -> ChannelId {
    ChannelId::new(20)
}

pub fn requester() -> Requester {
    Requester::new(UserId::new(7), "alice")
}

/// A valid 11 character video id derived from a short name.
pub fn video_id(name: &str) -> String {
    format!("{:_<11}", name)
}

pub fn watch_url(name: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id(name))
}

pub fn track(name: &str) -> Track {
    Track::new(watch_url(name), requester(), name)
}

/// An invoker sitting in `voice`, typing in the test text channel.
pub fn invoker(voice: Option<ChannelId>) -> Invoker {
    Invoker {
        user: requester(),
        voice_channel: voice,
        text_channel: text_channel(),
    }
}

/// Resolver behavior used by the canned mock: `list:a,b` is a playlist, `missing`
/// finds nothing, anything else is a single video named after the query.
pub fn catalog(query: &str, requester: &Requester) -> MusicResult<Resolved> {
    if let Some(names) = query.strip_prefix("list:") {
        let tracks: Vec<Track> = names
            .split(',')
            .filter(|name| !name.is_empty())
            .map(|name| Track::new(watch_url(name), requester.clone(), name))
            .collect();
        if tracks.is_empty() {
            return Err(MusicError::NotFound("No videos found in the playlist.".to_string()));
        }
        return Ok(Resolved::Playlist(tracks));
    }

    if query == "missing" {
        return Err(MusicError::NotFound(
            "No results found on YouTube for your query.".to_string(),
        ));
    }

    Ok(Resolved::Single(Track::new(
        watch_url(query),
        requester.clone(),
        query,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_ids_are_cacheable() {
        assert!(track("a").cache_id().is_some());
        assert!(track("longername").cache_id().is_some());
    }
}
