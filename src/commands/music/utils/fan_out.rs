//! One producer, two independent sinks: the live player and the cache writer.

use bytes::Bytes;
use tracing::warn;

/// What the cache writer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheFeed {
    Chunk(Bytes),
    /// The source completed successfully; the entry may be published.
    Finish,
}

/// Result of delivering one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The live consumer went away (playback stopped).
    LiveClosed,
}

/// Delivers every chunk, in order, to the live consumer and (while it keeps up with
/// the feed) the cache writer.
///
/// The cache side is unbounded so a slow disk never stalls playback; if the cache
/// writer fails and drops its receiver, the cache sink is detached and the live side
/// carries on alone.
pub struct FanOut {
    live: flume::Sender<Bytes>,
    cache: Option<flume::Sender<CacheFeed>>,
}

impl FanOut {
    pub fn new(live: flume::Sender<Bytes>, cache: Option<flume::Sender<CacheFeed>>) -> Self {
        Self { live, cache }
    }

    pub fn has_cache_sink(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn push(&mut self, chunk: Bytes) -> Delivery {
        if let Some(cache) = &self.cache {
            if cache.send(CacheFeed::Chunk(chunk.clone())).is_err() {
                warn!("Cache writer went away; continuing without caching");
                self.cache = None;
            }
        }

        match self.live.send_async(chunk).await {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::LiveClosed,
        }
    }

    /// Signal successful completion to the cache writer and close the live stream.
    pub fn finish(self) {
        if let Some(cache) = self.cache {
            let _ = cache.send(CacheFeed::Finish);
        }
    }

    /// Close both sinks without telling the cache writer to publish.
    pub fn abandon(self) {}
}
