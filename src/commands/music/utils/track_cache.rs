//! Filesystem-backed store of transcoded tracks, keyed by video identifier.
//!
//! Entries are written to a temporary `*.part` file and only become visible under
//! `<id>.ogg` once [`CacheWriteHandle::commit`] renames them into place, so a reader
//! never observes a partially written entry. Entries are never evicted.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::commands::music::audio_sources::youtube::YoutubeApi;

use super::music_manager::{MusicError, MusicResult};

/// Container extension of every published entry.
pub const CACHE_EXTENSION: &str = "ogg";
/// Suffix of in-progress writes. Never recognized by lookups.
pub const TEMP_SUFFIX: &str = "part";

/// A validated cache key (an 11 character video identifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheId(String);

impl CacheId {
    /// Accepts only well-formed video identifiers, which also keeps keys safe as file names.
    pub fn parse(raw: &str) -> Option<Self> {
        YoutubeApi::is_video_id(raw).then(|| Self(raw.to_string()))
    }

    /// Derives the key from a video URL.
    pub fn from_url(url: &str) -> Option<Self> {
        YoutubeApi::extract_video_id(url).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The cache directory.
#[derive(Debug)]
pub struct TrackCache {
    root: PathBuf,
    write_seq: AtomicU64,
}

impl TrackCache {
    /// Opens (creating if needed) the cache directory and deletes temporary files
    /// left behind by a previous run.
    pub async fn open(root: impl Into<PathBuf>) -> MusicResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            MusicError::CacheWriteFailed(format!("cannot create {}: {}", root.display(), e))
        })?;

        let cache = Self {
            root,
            write_seq: AtomicU64::new(0),
        };

        match cache.sweep_stale_writes().await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} stale temporary cache files", removed),
            Err(e) => warn!("Failed to sweep stale cache files: {}", e),
        }

        info!("Track cache ready at {}", cache.root.display());
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The final, published location of an entry.
    pub fn entry_path(&self, id: &CacheId) -> PathBuf {
        self.root.join(format!("{}.{}", id, CACHE_EXTENSION))
    }

    /// Whether a published entry exists for `id`.
    pub async fn has(&self, id: &CacheId) -> bool {
        fs::metadata(self.entry_path(id))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Opens a published entry for reading.
    pub async fn open_for_read(&self, id: &CacheId) -> MusicResult<fs::File> {
        match fs::File::open(self.entry_path(id)).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(MusicError::NotFound(format!("no cache entry for {}", id)))
            }
            Err(e) => Err(MusicError::NotFound(format!(
                "cache entry for {} unreadable: {}",
                id, e
            ))),
        }
    }

    /// Starts a new write for `id`. Each write gets its own temporary file, so two
    /// concurrent writers for the same id never interfere; the last to commit wins.
    pub async fn begin_write(&self, id: &CacheId) -> MusicResult<CacheWriteHandle> {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp_path = self.root.join(format!(
            "{}.{}-{}.{}",
            id,
            std::process::id(),
            seq,
            TEMP_SUFFIX
        ));

        let file = fs::File::create(&temp_path).await.map_err(|e| {
            MusicError::CacheWriteFailed(format!("cannot create {}: {}", temp_path.display(), e))
        })?;

        debug!("Started cache write for {} at {}", id, temp_path.display());

        Ok(CacheWriteHandle {
            id: id.clone(),
            writer: Some(BufWriter::new(file)),
            temp_path,
            final_path: self.entry_path(id),
            written: 0,
        })
    }

    async fn sweep_stale_writes(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_SUFFIX) {
                debug!("Removing stale cache file {}", path.display());
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// An in-progress cache entry. Dropping the handle without committing discards the data.
#[derive(Debug)]
pub struct CacheWriteHandle {
    id: CacheId,
    writer: Option<BufWriter<fs::File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

impl CacheWriteHandle {
    pub fn id(&self) -> &CacheId {
        &self.id
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, bytes: &[u8]) -> MusicResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MusicError::CacheWriteFailed("write after close".to_string()))?;

        writer
            .write_all(bytes)
            .await
            .map_err(|e| MusicError::CacheWriteFailed(format!("{}: {}", self.id, e)))?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes and atomically publishes the entry under its final name.
    pub async fn commit(mut self) -> MusicResult<PathBuf> {
        let result = self.publish().await;
        if result.is_err() {
            self.discard().await;
        }
        result
    }

    /// Discards everything written so far.
    pub async fn abandon(mut self) {
        debug!(
            "Abandoning cache write for {} after {} bytes",
            self.id,
            self.bytes_written()
        );
        self.discard().await;
    }

    async fn publish(&mut self) -> MusicResult<PathBuf> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| MusicError::CacheWriteFailed("commit after close".to_string()))?;

        let fail = |e: std::io::Error| MusicError::CacheWriteFailed(format!("{}: {}", self.id, e));

        writer.flush().await.map_err(fail)?;
        writer.get_ref().sync_all().await.map_err(fail)?;
        drop(writer);

        fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(fail)?;

        info!(
            "Published cache entry {} ({} bytes)",
            self.final_path.display(),
            self.written
        );
        Ok(self.final_path.clone())
    }

    async fn discard(&mut self) {
        self.writer.take();
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(
                    "Failed to remove temporary cache file {}: {}",
                    self.temp_path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for CacheWriteHandle {
    fn drop(&mut self) {
        // Still open means neither commit nor abandon ran: the owning task panicked
        // or was aborted. A single unlink, so the blocking call is acceptable here.
        if self.writer.take().is_some() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
