use std::time::Duration;

use pretty_assertions::assert_eq;
use test_case::test_case;

use encore::commands::music::utils::music_manager::OutcomeKind;
use encore::commands::music::utils::queue_manager::LoopMode;

use crate::common::fixtures::{guild, invoker, other_voice_channel, voice_channel};
use crate::common::{Harness, eventually};
use crate::test_utils;

const SAME_CHANNEL: &str = "You need to be in the same voice channel as the bot to use this command.";

#[test_case(None, "Please provide a URL or search terms to play!" ; "missing query")]
#[test_case(Some("   "), "Please provide a URL or search terms to play!" ; "blank query")]
#[test_case(Some("missing"), "No results found on YouTube for your query." ; "no search results")]
#[tokio::test]
async fn test_play_rejections(query: Option<&str>, message: &str) {
    test_utils::init();
    let harness = Harness::new().await;

    let outcome = harness
        .manager
        .enqueue_from_query(guild(), &invoker(Some(voice_channel())), query)
        .await;

    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert_eq!(outcome.message, message);
    assert_eq!(harness.output.attach_count(), 0);
}

#[tokio::test]
async fn test_play_requires_a_voice_channel() {
    test_utils::init();
    let harness = Harness::new().await;

    let outcome = harness
        .manager
        .enqueue_from_query(guild(), &invoker(None), Some("song"))
        .await;

    assert_eq!(outcome.message, "You need to be in a voice channel to play music!");
    assert_eq!(harness.transport.joins(), 0);
}

#[tokio::test]
async fn test_play_reports_refused_join() {
    test_utils::init();
    let harness = Harness::new().await;
    harness.transport.refuse_joins();

    let outcome = harness
        .manager
        .enqueue_from_query(guild(), &invoker(Some(voice_channel())), Some("song"))
        .await;

    assert_eq!(outcome.message, "Failed to join the voice channel.");
    assert_eq!(harness.transport.leaves(), 1);
    assert!(harness.registry.get(guild()).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_play_reports_join_timeout() {
    test_utils::init();
    let harness = Harness::new().await;
    harness.transport.set_join_delay(Duration::from_secs(60));

    let outcome = harness
        .manager
        .enqueue_from_query(guild(), &invoker(Some(voice_channel())), Some("song"))
        .await;

    assert_eq!(outcome.message, "Failed to join the voice channel.");
    assert_eq!(harness.transport.channel(guild()), None);
}

#[tokio::test]
async fn test_play_single_and_playlist_replies() {
    test_utils::init();
    let harness = Harness::new().await;
    let invoker = invoker(Some(voice_channel()));

    let outcome = harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("opener"))
        .await;
    assert_eq!(outcome.kind, OutcomeKind::Success);
    assert_eq!(outcome.message, "Added to queue: **opener**");
    assert_eq!(harness.transport.channel(guild()), Some(voice_channel()));

    let outcome = harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("list:b,c"))
        .await;
    assert_eq!(outcome.message, "Added 2 songs from the playlist to the queue.");

    eventually("opener attached", || harness.output.attach_count() == 1).await;
    assert_eq!(harness.transport.joins(), 1);
}

#[tokio::test]
async fn test_commands_from_another_channel_are_refused() {
    test_utils::init();
    let harness = Harness::new().await;
    harness.transport.place_bot(guild(), other_voice_channel());
    let outsider = invoker(Some(voice_channel()));

    let replies = vec![
        harness
            .manager
            .enqueue_from_query(guild(), &outsider, Some("song"))
            .await,
        harness.manager.skip(guild(), &outsider).await,
        harness.manager.pause(guild(), &outsider).await,
        harness.manager.resume(guild(), &outsider).await,
        harness
            .manager
            .set_volume_percent(guild(), &outsider, Some("50"))
            .await,
        harness
            .manager
            .set_loop_mode(guild(), &outsider, Some("song"))
            .await,
        harness.manager.leave(guild(), &outsider).await,
    ];

    for reply in replies {
        assert_eq!(reply.kind, OutcomeKind::Failure);
        assert_eq!(reply.message, SAME_CHANNEL);
    }
    assert_eq!(harness.transport.channel(guild()), Some(other_voice_channel()));
    assert_eq!(harness.transport.joins(), 0);
}

#[tokio::test]
async fn test_controls_while_nothing_plays() {
    test_utils::init();
    let harness = Harness::new().await;
    let invoker = invoker(Some(voice_channel()));

    let skip = harness.manager.skip(guild(), &invoker).await;
    let pause = harness.manager.pause(guild(), &invoker).await;
    let resume = harness.manager.resume(guild(), &invoker).await;

    assert_eq!(skip.message, "No song is currently playing.");
    assert_eq!(pause.message, "No song is currently playing.");
    assert_eq!(resume.message, "No song is currently paused.");
    assert_eq!(skip.kind, OutcomeKind::Info);
}

#[tokio::test]
async fn test_pause_and_resume_reach_the_output() {
    test_utils::init();
    let harness = Harness::new().await;
    let invoker = invoker(Some(voice_channel()));

    harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("song"))
        .await;
    eventually("song attached", || harness.output.attach_count() == 1).await;

    let outcome = harness.manager.pause(guild(), &invoker).await;
    assert_eq!(outcome.message, "Paused the current song.");
    assert!(harness.output.handle_state(0).paused);

    let outcome = harness.manager.pause(guild(), &invoker).await;
    assert_eq!(outcome.message, "No song is currently playing.");

    let outcome = harness.manager.resume(guild(), &invoker).await;
    assert_eq!(outcome.message, "Resumed the current song.");
    assert!(!harness.output.handle_state(0).paused);

    let outcome = harness.manager.resume(guild(), &invoker).await;
    assert_eq!(outcome.message, "No song is currently paused.");
}

#[tokio::test]
async fn test_volume_applies_now_and_to_later_tracks() {
    test_utils::init();
    let harness = Harness::new().await;
    let invoker = invoker(Some(voice_channel()));

    harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("list:loud,quiet"))
        .await;
    eventually("first attached", || harness.output.attach_count() == 1).await;
    assert_eq!(harness.output.handle_state(0).volume, 1.0);

    let outcome = harness
        .manager
        .set_volume_percent(guild(), &invoker, Some("40"))
        .await;
    assert_eq!(outcome.message, "Volume set to 40%.");
    assert_eq!(harness.output.handle_state(0).volume, 0.4);

    harness.output.finish(0);
    eventually("second attached", || harness.output.attach_count() == 2).await;
    assert_eq!(harness.output.handle_state(1).volume, 0.4);
}

#[test_case(None, "Please provide a volume level between 0 and 100." ; "missing")]
#[test_case(Some("250"), "Volume must be a number between 0 and 100." ; "out of range")]
#[tokio::test]
async fn test_bad_volume_is_rejected(raw: Option<&str>, message: &str) {
    test_utils::init();
    let harness = Harness::new().await;

    let outcome = harness
        .manager
        .set_volume_percent(guild(), &invoker(Some(voice_channel())), raw)
        .await;

    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert_eq!(outcome.message, message);
}

#[test_case("off", LoopMode::Off ; "off")]
#[test_case("song", LoopMode::Song ; "song")]
#[test_case("queue", LoopMode::Queue ; "queue")]
#[tokio::test]
async fn test_loop_mode_is_stored(raw: &str, mode: LoopMode) {
    test_utils::init();
    let harness = Harness::new().await;

    let outcome = harness
        .manager
        .set_loop_mode(guild(), &invoker(Some(voice_channel())), Some(raw))
        .await;

    assert_eq!(outcome.message, format!("Loop mode set to {}.", raw));
    assert_eq!(harness.manager.list_queue(guild()).await.loop_mode, mode);
}

#[tokio::test]
async fn test_unknown_loop_mode_is_rejected() {
    test_utils::init();
    let harness = Harness::new().await;

    let outcome = harness
        .manager
        .set_loop_mode(guild(), &invoker(Some(voice_channel())), Some("forever"))
        .await;

    assert_eq!(outcome.kind, OutcomeKind::Failure);
    assert_eq!(harness.manager.list_queue(guild()).await.loop_mode, LoopMode::Off);
}

#[tokio::test]
async fn test_queue_listing() {
    test_utils::init();
    let harness = Harness::new().await;

    let empty = harness.manager.queue(guild()).await;
    assert_eq!(empty.message, "The queue is empty.");

    harness
        .manager
        .enqueue_from_query(guild(), &invoker(Some(voice_channel())), Some("list:a,b,c"))
        .await;
    eventually("a attached", || harness.output.attach_count() == 1).await;

    let listing = harness.manager.list_queue(guild()).await;
    assert_eq!(listing.now_playing.map(|t| t.title), Some("a".to_string()));
    let upcoming: Vec<(usize, String)> = listing
        .upcoming
        .into_iter()
        .map(|(position, track)| (position, track.title))
        .collect();
    assert_eq!(upcoming, vec![(1, "b".to_string()), (2, "c".to_string())]);
    assert_eq!(listing.hidden, 0);

    let rendered = harness.manager.queue(guild()).await.message;
    assert!(rendered.starts_with("__Now Playing__\n\n**a** (requested by alice)"));
    assert!(rendered.contains("1. **b** (requested by alice)\n2. **c** (requested by alice)"));
    assert!(rendered.ends_with("__Loop Mode:__ off"));
}

#[tokio::test]
async fn test_queue_listing_is_truncated() {
    test_utils::init();
    let harness = Harness::new().await;
    let names: Vec<String> = (0..13).map(|i| format!("t{}", i)).collect();

    harness
        .manager
        .enqueue_from_query(
            guild(),
            &invoker(Some(voice_channel())),
            Some(&format!("list:{}", names.join(","))),
        )
        .await;
    eventually("first attached", || harness.output.attach_count() == 1).await;

    let listing = harness.manager.list_queue(guild()).await;
    assert_eq!(listing.upcoming.len(), 10);
    assert_eq!(listing.upcoming[9].0, 10);
    assert_eq!(listing.hidden, 2);
    assert!(listing.render().contains("\n...and 2 more"));
}

#[tokio::test]
async fn test_leave_tears_the_guild_down() {
    test_utils::init();
    let harness = Harness::new().await;
    let invoker = invoker(Some(voice_channel()));

    harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("list:a,b"))
        .await;
    eventually("a attached", || harness.output.attach_count() == 1).await;

    let outcome = harness.manager.leave(guild(), &invoker).await;

    assert_eq!(outcome.message, "Left the voice channel.");
    assert!(harness.registry.is_empty());
    assert_eq!(harness.transport.channel(guild()), None);
    assert_eq!(harness.transport.leaves(), 1);
    assert!(harness.output.handle_state(0).stopped);
    assert!(harness.manager.list_queue(guild()).await.is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.output.attach_count(), 1);
}

#[tokio::test]
async fn test_leave_when_not_connected() {
    test_utils::init();
    let harness = Harness::new().await;

    let outcome = harness
        .manager
        .leave(guild(), &invoker(Some(voice_channel())))
        .await;

    assert_eq!(outcome.kind, OutcomeKind::Info);
    assert_eq!(outcome.message, "I am not in a voice channel.");
    assert_eq!(harness.transport.leaves(), 0);
}

#[tokio::test]
async fn test_leave_after_losing_the_connection_releases_the_session() {
    test_utils::init();
    let harness = Harness::new().await;
    let invoker = invoker(Some(voice_channel()));

    harness
        .manager
        .set_loop_mode(guild(), &invoker, Some("queue"))
        .await;
    harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("list:a,b"))
        .await;
    eventually("a attached", || harness.output.attach_count() == 1).await;

    // Kicked from the channel: the gateway no longer reports a connection.
    harness.transport.drop_connection(guild());

    let outcome = harness.manager.leave(guild(), &invoker).await;

    assert_eq!(outcome.message, "I am not in a voice channel.");
    assert!(harness.registry.is_empty());
    assert!(harness.output.handle_state(0).stopped);
    let listing = harness.manager.list_queue(guild()).await;
    assert!(listing.is_empty());
    assert_eq!(listing.loop_mode, LoopMode::Off);
}

#[tokio::test]
async fn test_play_after_leave_starts_fresh() {
    test_utils::init();
    let harness = Harness::new().await;
    let invoker = invoker(Some(voice_channel()));

    harness
        .manager
        .set_loop_mode(guild(), &invoker, Some("queue"))
        .await;
    harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("first"))
        .await;
    eventually("first attached", || harness.output.attach_count() == 1).await;
    harness.manager.leave(guild(), &invoker).await;

    harness
        .manager
        .enqueue_from_query(guild(), &invoker, Some("second"))
        .await;
    eventually("second attached", || harness.output.attach_count() == 2).await;

    let listing = harness.manager.list_queue(guild()).await;
    assert_eq!(listing.now_playing.map(|t| t.title), Some("second".to_string()));
    assert_eq!(listing.loop_mode, LoopMode::Off);
    assert_eq!(harness.transport.joins(), 2);
}
