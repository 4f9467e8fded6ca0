//! Implements the `SourceResolver` trait for YouTube.
//! Uses the `yt-dlp` command-line tool for search, video lookup and playlist expansion.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serenity::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::commands::music::utils::music_manager::{MusicError, MusicResult};

use super::{Requester, Resolved, SourceResolver, Track};

/// Regex matching a bare YouTube video identifier.
static VIDEO_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id regex is valid"));

const UNKNOWN_TITLE: &str = "Unknown Title";

/// The subset of `yt-dlp` JSON output we care about.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistInfo {
    #[serde(default)]
    entries: Vec<Option<VideoInfo>>,
}

/// Resolves free text and YouTube URLs by shelling out to `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YoutubeApi {
    binary: String,
}

impl Default for YoutubeApi {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl SourceResolver for YoutubeApi {
    async fn resolve(&self, query: &str, requester: &Requester) -> MusicResult<Resolved> {
        if Self::is_playlist_url(query) {
            info!("Expanding YouTube playlist: {}", query);
            // A failing lookup is reported the same way as an empty playlist.
            let tracks = match self.run(&["--flat-playlist", "-J", query]).await {
                Ok(output) => Self::parse_playlist(&output, requester)?,
                Err(e) => {
                    warn!("Playlist lookup failed for {}: {}", query, e);
                    Vec::new()
                }
            };
            if tracks.is_empty() {
                return Err(MusicError::NotFound(
                    "No videos found in the playlist.".to_string(),
                ));
            }
            return Ok(Resolved::Playlist(tracks));
        }

        if Self::is_youtube_url(query) {
            info!("Looking up YouTube video: {}", query);
            let output = self.run(&["-j", "--no-playlist", query]).await?;
            return Self::parse_video(&output, requester).map(Resolved::Single);
        }

        info!("Searching YouTube for: {}", query);
        let search = format!("ytsearch1:{}", query);
        let output = match self.run(&["-j", "--no-playlist", &search]).await {
            Ok(output) => output,
            Err(e) => {
                warn!("YouTube search failed for {:?}: {}", query, e);
                String::new()
            }
        };

        if output.trim().is_empty() {
            return Err(MusicError::NotFound(
                "No results found on YouTube for your query.".to_string(),
            ));
        }
        Self::parse_video(&output, requester).map(Resolved::Single)
    }
}

impl YoutubeApi {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> MusicResult<String> {
        debug!("Running {} {:?}", self.binary, args);
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MusicError::FetchFailed(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(MusicError::FetchFailed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Canonical watch URL for a video id.
    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", video_id)
    }

    pub fn is_video_id(candidate: &str) -> bool {
        VIDEO_ID_REGEX.is_match(candidate)
    }

    /// Checks if the input string is a YouTube URL pointing at a single video.
    pub fn is_youtube_url(query: &str) -> bool {
        Self::extract_video_id(query).is_some()
    }

    /// A URL carrying a `list` parameter and no video of its own.
    pub fn is_playlist_url(query: &str) -> bool {
        let Ok(url) = Url::parse(query) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        if Self::normalize_host(host) != "youtube.com" {
            return false;
        }

        url.query_pairs().any(|(key, _)| key == "list") && Self::extract_video_id(query).is_none()
    }

    /// Extracts the video id from the common YouTube URL shapes
    /// (`watch?v=`, `youtu.be/`, `shorts/`, `embed/`, `v/`, `live/`).
    pub fn extract_video_id(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = Self::normalize_host(parsed.host_str()?);
        let mut segments = parsed.path_segments()?;

        let candidate = match host {
            "youtu.be" => segments.next().map(str::to_string),
            "youtube.com" | "youtube-nocookie.com" => match segments.next()? {
                "watch" => parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                "shorts" | "embed" | "v" | "live" => segments.next().map(str::to_string),
                _ => None,
            },
            _ => None,
        }?;

        Self::is_video_id(&candidate).then_some(candidate)
    }

    fn normalize_host(host: &str) -> &str {
        host.trim_start_matches("www.")
            .trim_start_matches("m.")
            .trim_start_matches("music.")
    }

    /// Converts `yt-dlp -j` output into a track.
    fn parse_video(output: &str, requester: &Requester) -> MusicResult<Track> {
        // Search output may hold several JSON lines; the first is the best match.
        let line = output
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| MusicError::NotFound("yt-dlp returned no video".to_string()))?;

        let info: VideoInfo = serde_json::from_str(line).map_err(|e| {
            MusicError::FetchFailed(format!("Failed to parse video metadata: {}", e))
        })?;

        Self::track_from_info(info, requester).ok_or_else(|| {
            MusicError::FetchFailed("video metadata carried no usable URL".to_string())
        })
    }

    /// Converts `yt-dlp --flat-playlist -J` output into tracks, skipping unavailable entries.
    fn parse_playlist(output: &str, requester: &Requester) -> MusicResult<Vec<Track>> {
        let playlist: PlaylistInfo = serde_json::from_str(output).map_err(|e| {
            MusicError::FetchFailed(format!("Failed to parse playlist metadata: {}", e))
        })?;

        Ok(playlist
            .entries
            .into_iter()
            .flatten()
            .filter_map(|info| Self::track_from_info(info, requester))
            .collect())
    }

    fn track_from_info(info: VideoInfo, requester: &Requester) -> Option<Track> {
        let url = match (&info.id, info.webpage_url) {
            (Some(id), _) if Self::is_video_id(id) => Self::watch_url(id),
            (_, Some(url)) => url,
            _ => return None,
        };
        let title = info
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        Some(Track::new(url, requester.clone(), title))
    }
}
