//! Process configuration, read from the environment (after `.env` is loaded).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use humantime_serde::re::humantime;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub discord_token: String,
    pub command_prefix: String,
    pub cache_dir: PathBuf,
    /// Upper bound on waiting for a voice connection to become ready.
    pub connect_timeout: Duration,
    pub audio_bitrate: String,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub queue_display_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let discord_token = get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let connect_timeout = match get("CONNECT_TIMEOUT") {
            Some(raw) => humantime::parse_duration(&raw).map_err(|e| ConfigError::Invalid {
                key: "CONNECT_TIMEOUT",
                reason: e.to_string(),
            })?,
            None => Duration::from_secs(30),
        };
        if connect_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "CONNECT_TIMEOUT",
                reason: "must be greater than zero".to_string(),
            });
        }

        let audio_bitrate = or("AUDIO_BITRATE", "128k");
        if !is_bitrate(&audio_bitrate) {
            return Err(ConfigError::Invalid {
                key: "AUDIO_BITRATE",
                reason: format!("'{}' is not a bitrate like 96k or 128000", audio_bitrate),
            });
        }

        let queue_display_limit = match get("QUEUE_DISPLAY_LIMIT") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "QUEUE_DISPLAY_LIMIT",
                    reason: format!("'{}' is not a positive number", raw),
                })?,
            None => 10,
        };

        Ok(Self {
            discord_token,
            command_prefix: or("COMMAND_PREFIX", "-"),
            cache_dir: PathBuf::from(or("CACHE_DIR", "cache")),
            connect_timeout,
            audio_bitrate,
            ytdlp_path: or("YTDLP_PATH", "yt-dlp"),
            ffmpeg_path: or("FFMPEG_PATH", "ffmpeg"),
            queue_display_limit,
        })
    }
}

fn is_bitrate(raw: &str) -> bool {
    let digits = raw.strip_suffix(['k', 'K']).unwrap_or(raw);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
