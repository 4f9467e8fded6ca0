//! Turns a [`Track`] into something the player can consume.
//!
//! A cached track is served straight from disk. Otherwise the source is fetched,
//! transcoded, and the transcoder output is fanned out to the live player and to a
//! cache write at the same time, so caching never delays the first playback.

use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use bytes::{Buf, Bytes};
use futures::StreamExt;
use futures::future::BoxFuture;
use serenity::async_trait;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::commands::music::audio_sources::Track;

use super::fan_out::{CacheFeed, Delivery, FanOut};
use super::music_manager::{MusicError, MusicResult};
use super::track_cache::{CacheWriteHandle, TrackCache};

/// Chunks buffered between the transcoder and the live player.
const LIVE_BUFFER_CHUNKS: usize = 256;

/// A byte stream produced by an external process, plus a future resolving once the
/// producer has exited (with its success or failure).
pub struct ByteStream {
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    pub completion: BoxFuture<'static, MusicResult<()>>,
}

impl ByteStream {
    pub fn new(
        reader: impl AsyncRead + Send + 'static,
        completion: impl Future<Output = MusicResult<()>> + Send + 'static,
    ) -> Self {
        Self {
            reader: Box::pin(reader),
            completion: Box::pin(completion),
        }
    }
}

/// Opens the raw audio stream behind a source URL.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> MusicResult<ByteStream>;
}

/// Converts a raw stream into the fixed output codec and container.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: ByteStream) -> MusicResult<ByteStream>;
}

/// An incrementally playable audio stream.
#[derive(Debug)]
pub enum AudioSource {
    /// A published cache entry, opened for reading.
    Cached(std::fs::File),
    /// Transcoder output arriving as it is produced.
    Live(LiveStream),
}

/// Receiving end of the live branch of a fan-out. Dropping it before the end
/// interrupts the job feeding it.
#[derive(Debug)]
pub struct LiveStream {
    chunks: flume::Receiver<Bytes>,
    pending: Bytes,
    _interrupt: Option<DropGuard>,
}

impl LiveStream {
    #[cfg(test)]
    pub(crate) fn new(chunks: flume::Receiver<Bytes>) -> Self {
        Self {
            chunks,
            pending: Bytes::new(),
            _interrupt: None,
        }
    }

    fn primed(chunks: flume::Receiver<Bytes>, first: Bytes, job: &PlaybackJob) -> Self {
        Self {
            chunks,
            pending: first,
            _interrupt: Some(job.cancel.clone().drop_guard()),
        }
    }

    /// Next chunk from the producer, `None` once the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        if !self.pending.is_empty() {
            return Some(std::mem::take(&mut self.pending));
        }
        self.chunks.recv_async().await.ok()
    }

    /// Drains the whole stream.
    pub async fn read_to_end(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

/// Blocking read used by the voice driver's decoder thread.
impl Read for LiveStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pending.is_empty() {
            match self.chunks.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

/// Which branch produced a [`ResolvedAudio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOrigin {
    Cache,
    Live { caching: bool },
}

/// Output of [`PlaybackPipeline::resolve`].
#[derive(Debug)]
pub struct ResolvedAudio {
    pub source: AudioSource,
    pub origin: AudioOrigin,
    /// The background fetch/transcode for the live branch.
    pub job: Option<PlaybackJob>,
}

/// How a playback job ended.
#[derive(Debug)]
pub struct JobReport {
    /// Bytes delivered to the live consumer.
    pub bytes: u64,
    /// Whether a cache entry was published.
    pub cached: bool,
    /// Whether the job was interrupted (stop, skip, or the player went away).
    pub interrupted: bool,
    pub error: Option<MusicError>,
}

/// An in-flight fetch+transcode. Dropping it interrupts the transfer; a cache entry
/// is only published when the source ran to completion.
#[derive(Debug)]
pub struct PlaybackJob {
    cancel: CancellationToken,
    pump: Option<JoinHandle<JobReport>>,
    failure: Arc<OnceLock<MusicError>>,
}

impl PlaybackJob {
    fn spawn(
        label: String,
        stream: ByteStream,
        writer: Option<CacheWriteHandle>,
        live: flume::Sender<Bytes>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let failure = Arc::new(OnceLock::new());
        let pump = tokio::spawn(pump(
            label,
            stream,
            writer,
            live,
            cancel.clone(),
            failure.clone(),
        ));
        Self {
            cancel,
            pump: Some(pump),
            failure,
        }
    }

    /// Why the source or transcoder failed, once it has. Set before the live stream
    /// is closed, so a consumer that reached the end of the stream sees it.
    pub fn failure(&self) -> Option<&MusicError> {
        self.failure.get()
    }

    /// Abort the underlying stream. In-flight cache writes are abandoned.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.pump.as_ref().is_none_or(|pump| pump.is_finished())
    }

    /// Wait for the job (including the cache write) to settle.
    pub async fn wait(mut self) -> JobReport {
        let Some(pump) = self.pump.take() else {
            return JobReport {
                bytes: 0,
                cached: false,
                interrupted: true,
                error: None,
            };
        };

        match pump.await {
            Ok(report) => report,
            Err(e) => JobReport {
                bytes: 0,
                cached: false,
                interrupted: true,
                error: Some(MusicError::PlaybackError(format!("playback job panicked: {}", e))),
            },
        }
    }
}

impl Drop for PlaybackJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Reads the transcoded stream and feeds both sinks.
async fn pump(
    label: String,
    stream: ByteStream,
    writer: Option<CacheWriteHandle>,
    live: flume::Sender<Bytes>,
    cancel: CancellationToken,
    failure: Arc<OnceLock<MusicError>>,
) -> JobReport {
    let (cache_tx, cache_task) = match writer {
        Some(writer) => {
            let (tx, rx) = flume::unbounded();
            (Some(tx), Some(tokio::spawn(write_cache(writer, rx))))
        }
        None => (None, None),
    };

    let caching = cache_tx.is_some();
    let mut fan_out = FanOut::new(live, cache_tx);
    let mut bytes = 0;
    let outcome = transfer(stream, &mut fan_out, &cancel, &mut bytes).await;

    let (interrupted, error) = match outcome {
        Ok(true) => {
            debug!("Transfer finished for '{}' ({} bytes)", label, bytes);
            if caching && !fan_out.has_cache_sink() {
                debug!("Cache branch for '{}' gave up early", label);
            }
            fan_out.finish();
            (false, None)
        }
        Ok(false) => {
            info!("Transfer interrupted for '{}' after {} bytes", label, bytes);
            fan_out.abandon();
            (true, None)
        }
        Err(e) => {
            error!("Transfer failed for '{}': {}", label, e);
            let _ = failure.set(e.clone());
            fan_out.abandon();
            (false, Some(e))
        }
    };

    let cached = match cache_task {
        Some(task) => task.await.unwrap_or(false),
        None => false,
    };

    JobReport {
        bytes,
        cached,
        interrupted,
        error,
    }
}

/// Returns `Ok(true)` when the source ran to completion, `Ok(false)` when interrupted.
async fn transfer(
    stream: ByteStream,
    fan_out: &mut FanOut,
    cancel: &CancellationToken,
    bytes: &mut u64,
) -> MusicResult<bool> {
    let ByteStream { reader, completion } = stream;
    let mut chunks = ReaderStream::new(reader);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                *bytes += chunk.len() as u64;
                let delivery = tokio::select! {
                    _ = cancel.cancelled() => return Ok(false),
                    delivery = fan_out.push(chunk) => delivery,
                };
                if delivery == Delivery::LiveClosed {
                    return Ok(false);
                }
            }
            Some(Err(e)) => return Err(MusicError::TranscodeFailed(e.to_string())),
            None => break,
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => Ok(false),
        result = completion => result.map(|()| true),
    }
}

/// Cache branch: writes every chunk and publishes only on [`CacheFeed::Finish`].
async fn write_cache(mut writer: CacheWriteHandle, feed: flume::Receiver<CacheFeed>) -> bool {
    while let Ok(item) = feed.recv_async().await {
        match item {
            CacheFeed::Chunk(chunk) => {
                if let Err(e) = writer.write(&chunk).await {
                    warn!("Cache write failed, playback continues uncached: {}", e);
                    writer.abandon().await;
                    return false;
                }
            }
            CacheFeed::Finish => {
                return match writer.commit().await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Cache publish failed: {}", e);
                        false
                    }
                };
            }
        }
    }

    debug!("Cache feed closed without completion for {}", writer.id());
    writer.abandon().await;
    false
}

/// Resolves tracks to audio sources, preferring the cache.
pub struct PlaybackPipeline {
    cache: Arc<TrackCache>,
    fetcher: Arc<dyn SourceFetcher>,
    transcoder: Arc<dyn Transcoder>,
}

impl PlaybackPipeline {
    pub fn new(
        cache: Arc<TrackCache>,
        fetcher: Arc<dyn SourceFetcher>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            transcoder,
        }
    }

    pub fn cache(&self) -> &Arc<TrackCache> {
        &self.cache
    }

    /// Resolve `track` to a playable source.
    ///
    /// Fails with `FetchFailed` or `TranscodeFailed` when the live branch cannot be
    /// started or ends before producing any audio. A cache that cannot be written
    /// only disables caching for this run.
    pub async fn resolve(&self, track: &Track) -> MusicResult<ResolvedAudio> {
        let cache_id = track.cache_id();

        if let Some(id) = &cache_id {
            if self.cache.has(id).await {
                match self.cache.open_for_read(id).await {
                    Ok(file) => {
                        info!("Cache hit for '{}' ({})", track.title, id);
                        return Ok(ResolvedAudio {
                            source: AudioSource::Cached(file.into_std().await),
                            origin: AudioOrigin::Cache,
                            job: None,
                        });
                    }
                    Err(e) => warn!("Cache entry {} vanished, fetching instead: {}", id, e),
                }
            }
        }

        info!("Cache miss for '{}', fetching {}", track.title, track.source_url);
        let fetched = self.fetcher.fetch(&track.source_url).await?;
        let transcoded = self.transcoder.transcode(fetched).await?;

        let writer = match &cache_id {
            Some(id) => match self.cache.begin_write(id).await {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!("Not caching '{}': {}", track.title, e);
                    None
                }
            },
            None => {
                debug!("'{}' has no cache id; streaming only", track.title);
                None
            }
        };
        let caching = writer.is_some();

        let (live_tx, live_rx) = flume::bounded(LIVE_BUFFER_CHUNKS);
        let job = PlaybackJob::spawn(track.title.clone(), transcoded, writer, live_tx);

        // The processes report most failures (unavailable video, bad input) by
        // exiting before any output, so wait for the first chunk.
        let first = match live_rx.recv_async().await {
            Ok(chunk) => chunk,
            Err(_) => {
                let report = job.wait().await;
                return Err(report.error.unwrap_or_else(|| {
                    MusicError::TranscodeFailed(format!("no audio produced for {}", track.source_url))
                }));
            }
        };
        debug!("First audio chunk for '{}' ({} bytes)", track.title, first.len());

        Ok(ResolvedAudio {
            source: AudioSource::Live(LiveStream::primed(live_rx, first, &job)),
            origin: AudioOrigin::Live { caching },
            job: Some(job),
        })
    }
}
