//! External processes behind the playback pipeline: yt-dlp for the raw audio and
//! ffmpeg for the Ogg/Opus transcode.

use std::io::ErrorKind;
use std::process::Stdio;

use serenity::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::music_manager::{MusicError, MusicResult};
use super::playback_pipeline::{ByteStream, SourceFetcher, Transcoder};

/// Streams the best audio-only format of a video through yt-dlp's stdout.
pub struct YtDlpFetcher {
    binary: String,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(url: &str) -> Vec<String> {
        ["-f", "bestaudio", "--no-playlist", "--quiet", "-o", "-", url]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

#[async_trait]
impl SourceFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str) -> MusicResult<ByteStream> {
        debug!("Fetching {} with {}", url, self.binary);
        let mut child = Command::new(&self.binary)
            .args(Self::args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MusicError::FetchFailed(format!("failed to run {}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MusicError::FetchFailed("yt-dlp stdout unavailable".to_string()))?;
        let stderr = collect_stderr(child.stderr.take());
        let binary = self.binary.clone();

        let completion = async move {
            let (status, stderr) = wait_with_stderr(&mut child, stderr).await;
            match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(MusicError::FetchFailed(format!(
                    "{} exited with {}: {}",
                    binary,
                    status,
                    stderr.trim()
                ))),
                Err(e) => Err(MusicError::FetchFailed(format!("{}: {}", binary, e))),
            }
        };

        Ok(ByteStream::new(stdout, completion))
    }
}

/// Re-encodes any input to Ogg/Opus at a fixed bitrate with ffmpeg.
pub struct FfmpegTranscoder {
    binary: String,
    bitrate: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>, bitrate: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            bitrate: bitrate.into(),
        }
    }

    fn args(&self) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-analyzeduration",
            "0",
            "-i",
            "pipe:0",
            "-vn",
            "-c:a",
            "libopus",
            "-b:a",
            self.bitrate.as_str(),
            "-f",
            "ogg",
            "pipe:1",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: ByteStream) -> MusicResult<ByteStream> {
        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MusicError::TranscodeFailed(format!("failed to run {}: {}", self.binary, e))
            })?;

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(MusicError::TranscodeFailed(
                "ffmpeg pipes unavailable".to_string(),
            ));
        };
        let stderr = collect_stderr(child.stderr.take());

        // Feeding stdin must progress independently of whoever drains stdout.
        let ByteStream {
            mut reader,
            completion: upstream,
        } = input;
        let feeder = tokio::spawn(async move {
            let copied = tokio::io::copy(&mut reader, &mut stdin).await;
            drop(stdin);
            copied
        });

        let binary = self.binary.clone();
        let completion = async move {
            let upstream = upstream.await;
            let fed = feeder.await;
            let (status, stderr) = wait_with_stderr(&mut child, stderr).await;

            upstream?;
            match fed {
                Ok(Ok(bytes)) => debug!("Fed {} bytes to {}", bytes, binary),
                // ffmpeg may stop reading once it has what it needs.
                Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => {
                    return Err(MusicError::TranscodeFailed(format!(
                        "feeding {} failed: {}",
                        binary, e
                    )));
                }
                Err(e) => {
                    return Err(MusicError::TranscodeFailed(format!(
                        "{} feeder task failed: {}",
                        binary, e
                    )));
                }
            }

            match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(MusicError::TranscodeFailed(format!(
                    "{} exited with {}: {}",
                    binary,
                    status,
                    stderr.trim()
                ))),
                Err(e) => Err(MusicError::TranscodeFailed(format!("{}: {}", binary, e))),
            }
        };

        Ok(ByteStream::new(stdout, completion))
    }
}

/// Drain a child's stderr in the background so a chatty process never blocks.
fn collect_stderr(stderr: Option<impl AsyncRead + Send + Unpin + 'static>) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            if let Err(e) = stderr.read_to_string(&mut text).await {
                warn!("Could not read child stderr: {}", e);
            }
        }
        text
    })
}

async fn wait_with_stderr(
    child: &mut Child,
    stderr: JoinHandle<String>,
) -> (std::io::Result<std::process::ExitStatus>, String) {
    let status = child.wait().await;
    let stderr = stderr.await.unwrap_or_default();
    (status, stderr)
}
