use std::sync::Arc;

use ::serenity::all::ClientBuilder;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use songbird::{SerenityInit, Songbird};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use encore::commands::music::{
    audio_sources::youtube::YoutubeApi,
    leave::*,
    loop_mode::*,
    pause::*,
    play::*,
    queue::*,
    resume::*,
    skip::*,
    utils::{
        embedded_messages::SerenityAnnouncer,
        event_handlers::PlaybackScheduler,
        music_manager::MusicManager,
        playback_pipeline::PlaybackPipeline,
        session_registry::SessionRegistry,
        song_fetchers::{FfmpegTranscoder, YtDlpFetcher},
        songbird_adapter::SongbirdVoice,
        track_cache::TrackCache,
        voice_connection::VoiceConnections,
    },
    volume::*,
};
use encore::utils::config::Config;
use encore::{CommandResult, Context, Data, Error};

#[poise::command(slash_command, category = "General")]
async fn help(
    ctx: Context<'_>,
    #[description = "Specific command to show help about"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> CommandResult {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            show_context_menu_commands: true,
            ..Default::default()
        },
    )
    .await
    .map_err(|e| e.into())
}

#[poise::command(prefix_command, hide_in_help)]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx)
        .await
        .map_err(|e| e.into())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize logging with debug level for our crate
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("encore=debug,warn")),
        )
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true)
        .with_ansi(true)
        .pretty()
        .init();

    dotenv().ok();
    let config = Config::from_env()?;

    let cache = Arc::new(TrackCache::open(config.cache_dir.clone()).await?);
    info!("Using cache directory {}", cache.root().display());

    let pipeline = Arc::new(PlaybackPipeline::new(
        cache,
        Arc::new(YtDlpFetcher::new(config.ytdlp_path.clone())),
        Arc::new(FfmpegTranscoder::new(
            config.ffmpeg_path.clone(),
            config.audio_bitrate.clone(),
        )),
    ));
    let songbird = Songbird::serenity();
    let voice = Arc::new(SongbirdVoice::new(songbird.clone()));

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let commands = vec![
        // Default commands
        register(),
        help(),
        // Music commands
        play(),
        skip(),
        pause(),
        resume(),
        volume(),
        loop_mode(),
        queue(),
        leave(),
    ];

    let ytdlp_path = config.ytdlp_path.clone();
    let connect_timeout = config.connect_timeout;
    let queue_display_limit = config.queue_display_limit;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.command_prefix.clone()),
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let scheduler = Arc::new(PlaybackScheduler::new(
                    pipeline,
                    voice.clone(),
                    Arc::new(SerenityAnnouncer::new(ctx.http.clone())),
                ));
                let music = MusicManager::new(
                    Arc::new(SessionRegistry::new(scheduler)),
                    VoiceConnections::new(voice, connect_timeout),
                    Arc::new(YoutubeApi::new(ytdlp_path)),
                    queue_display_limit,
                );

                info!("Music commands ready");
                Ok(Data {
                    music: Arc::new(music),
                })
            })
        });

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework.build())
        .register_songbird_with(songbird)
        .await?;
    client.start().await.map_err(Into::into)
}
