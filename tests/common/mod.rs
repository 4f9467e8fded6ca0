//! Common test utilities, fixtures, and mocks
//! This module wires the music core to in-memory collaborators.

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use encore::commands::music::utils::event_handlers::PlaybackScheduler;
use encore::commands::music::utils::music_manager::MusicManager;
use encore::commands::music::utils::playback_pipeline::PlaybackPipeline;
use encore::commands::music::utils::session_registry::SessionRegistry;
use encore::commands::music::utils::track_cache::{CacheId, TrackCache};
use encore::commands::music::utils::voice_connection::VoiceConnections;

use fixtures::{SAMPLE_AUDIO, catalog, video_id};
use mocks::{
    FakeFetcher, FakeOutput, FakeTransport, MockResolver, PassthroughTranscoder,
    RecordingAnnouncer,
};

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}

/// A resolver answering from [`fixtures::catalog`].
pub fn catalog_resolver() -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver
        .expect_resolve()
        .returning(|query, requester| catalog(query, requester));
    resolver
}

pub struct Harness {
    pub manager: MusicManager,
    pub registry: Arc<SessionRegistry>,
    pub pipeline: Arc<PlaybackPipeline>,
    pub cache: Arc<TrackCache>,
    pub fetcher: Arc<FakeFetcher>,
    pub transcoder: Arc<PassthroughTranscoder>,
    pub output: Arc<FakeOutput>,
    pub transport: Arc<FakeTransport>,
    pub announcer: Arc<RecordingAnnouncer>,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_resolver(catalog_resolver()).await
    }

    pub async fn with_resolver(resolver: MockResolver) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(TrackCache::open(dir.path()).await.unwrap());
        let fetcher = Arc::new(FakeFetcher::new(SAMPLE_AUDIO));
        let transcoder = Arc::new(PassthroughTranscoder::default());
        let pipeline = Arc::new(PlaybackPipeline::new(
            cache.clone(),
            fetcher.clone(),
            transcoder.clone(),
        ));

        let output = Arc::new(FakeOutput::default());
        let transport = Arc::new(FakeTransport::default());
        let announcer = Arc::new(RecordingAnnouncer::default());

        let scheduler = Arc::new(PlaybackScheduler::new(
            pipeline.clone(),
            output.clone(),
            announcer.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(scheduler));
        let manager = MusicManager::new(
            registry.clone(),
            VoiceConnections::new(transport.clone(), Duration::from_secs(30)),
            Arc::new(resolver),
            10,
        );

        Self {
            manager,
            registry,
            pipeline,
            cache,
            fetcher,
            transcoder,
            output,
            transport,
            announcer,
            _dir: dir,
        }
    }

    /// Whether the cache holds a published entry for the named fixture track.
    pub fn is_cached(&self, name: &str) -> bool {
        let id = CacheId::parse(&video_id(name)).unwrap();
        self.cache.entry_path(&id).is_file()
    }

    /// Number of in-progress writes left in the cache directory.
    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(self.cache.root())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "part"))
            .count()
    }
}
