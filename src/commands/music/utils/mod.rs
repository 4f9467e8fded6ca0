// Export music utilities
pub mod embedded_messages;
pub mod event_handlers;
pub mod fan_out;
pub mod music_manager;
pub mod playback_pipeline;
pub mod player_session;
pub mod queue_manager;
pub mod session_registry;
pub mod song_fetchers;
pub mod songbird_adapter;
pub mod track_cache;
pub mod voice_connection;
