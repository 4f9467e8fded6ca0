use std::time::Duration;

use pretty_assertions::assert_eq;

use encore::commands::music::utils::player_session::PlayerState;

use crate::common::fixtures::{SAMPLE_AUDIO, guild, invoker, text_channel, voice_channel, watch_url};
use crate::common::{Harness, eventually};
use crate::test_utils;

async fn play(harness: &Harness, query: &str) {
    harness
        .manager
        .enqueue_from_query(guild(), &invoker(Some(voice_channel())), Some(query))
        .await;
}

async fn set_loop(harness: &Harness, mode: &str) {
    harness
        .manager
        .set_loop_mode(guild(), &invoker(Some(voice_channel())), Some(mode))
        .await;
}

async fn player_state(harness: &Harness) -> PlayerState {
    let session = harness.registry.get(guild()).unwrap();
    let state = session.lock().await.player_state();
    state
}

async fn current_title(harness: &Harness) -> Option<String> {
    let session = harness.registry.get(guild()).unwrap();
    let title = session.lock().await.current_track().map(|t| t.title.clone());
    title
}

#[tokio::test]
async fn test_tracks_play_in_order_then_idle() {
    test_utils::init();
    let harness = Harness::new().await;

    play(&harness, "first").await;
    play(&harness, "second").await;
    eventually("first track attached", || harness.output.attach_count() == 1).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("first"));

    eventually("first track consumed", || harness.output.played(0).is_some()).await;
    assert_eq!(harness.output.played(0).unwrap(), SAMPLE_AUDIO);

    harness.output.finish(0);
    eventually("second track attached", || harness.output.attach_count() == 2).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("second"));

    harness.output.finish(1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.output.attach_count(), 2);
    assert_eq!(player_state(&harness).await, PlayerState::Idle);
    assert_eq!(current_title(&harness).await, None);

    eventually("now playing notices", || harness.announcer.messages().len() >= 2).await;
    let messages = harness.announcer.messages();
    assert!(messages[0].starts_with("Now playing: **first**"));
    assert!(messages[1].starts_with("Now playing: **second**"));
    assert!(harness.announcer.channels().iter().all(|c| *c == text_channel()));
}

#[tokio::test]
async fn test_song_loop_replays_from_cache() {
    test_utils::init();
    let harness = Harness::new().await;
    set_loop(&harness, "song").await;

    play(&harness, "repeat").await;
    eventually("track attached", || harness.output.attach_count() == 1).await;
    eventually("entry published", || harness.is_cached("repeat")).await;

    for round in 1..=3 {
        harness.output.finish(round - 1);
        eventually("track replayed", || harness.output.attach_count() == round + 1).await;
        assert!(harness.output.was_cached(round));
        assert_eq!(current_title(&harness).await.as_deref(), Some("repeat"));
    }

    assert_eq!(harness.fetcher.fetches(), 1);
}

#[tokio::test]
async fn test_queue_loop_cycles() {
    test_utils::init();
    let harness = Harness::new().await;
    set_loop(&harness, "queue").await;

    play(&harness, "list:one,two").await;
    let mut titles = Vec::new();
    for index in 0..4 {
        eventually("next track attached", || harness.output.attach_count() == index + 1).await;
        titles.push(current_title(&harness).await.unwrap());
        eventually("track consumed", || harness.output.played(index).is_some()).await;
        harness.output.finish(index);
    }

    assert_eq!(titles, vec!["one", "two", "one", "two"]);
}

#[tokio::test]
async fn test_failed_track_is_skipped_and_not_retried() {
    test_utils::init();
    let harness = Harness::new().await;
    set_loop(&harness, "song").await;
    harness.fetcher.fail_for(watch_url("broken"));

    play(&harness, "list:broken,fine").await;
    eventually("fine track attached", || harness.output.attach_count() == 1).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("fine"));

    eventually("failure announced", || {
        harness
            .announcer
            .messages()
            .iter()
            .any(|m| m.starts_with("Could not play **broken**"))
    })
    .await;

    // Song loop keeps the track that works, the broken one is gone for good.
    eventually("fine published", || harness.is_cached("fine")).await;
    harness.output.finish(0);
    eventually("fine replayed", || harness.output.attach_count() == 2).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("fine"));
    assert!(harness.output.was_cached(1));
    assert_eq!(harness.fetcher.fetches(), 2);
}

#[tokio::test]
async fn test_end_event_for_skipped_track_is_ignored() {
    test_utils::init();
    let harness = Harness::new().await;

    play(&harness, "list:a,b,c").await;
    eventually("a attached", || harness.output.attach_count() == 1).await;

    let outcome = harness
        .manager
        .skip(guild(), &invoker(Some(voice_channel())))
        .await;
    assert_eq!(outcome.message, "Skipped the current song.");
    assert!(harness.output.handle_state(0).stopped);
    eventually("b attached", || harness.output.attach_count() == 2).await;

    // The output reports the stopped track late; it must not advance past b.
    harness.output.finish(0);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.output.attach_count(), 2);
    assert_eq!(current_title(&harness).await.as_deref(), Some("b"));
    assert_eq!(player_state(&harness).await, PlayerState::Playing);
}

#[tokio::test]
async fn test_playback_error_advances() {
    test_utils::init();
    let harness = Harness::new().await;

    play(&harness, "list:glitch,next").await;
    eventually("glitch attached", || harness.output.attach_count() == 1).await;

    harness.output.fail(0, "decoder gave up");
    eventually("next attached", || harness.output.attach_count() == 2).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("next"));

    eventually("error announced", || {
        harness
            .announcer
            .messages()
            .iter()
            .any(|m| m.starts_with("Playback of **glitch** failed"))
    })
    .await;
}

#[tokio::test]
async fn test_skip_and_leave_interrupt_unfinished_streams() {
    test_utils::init();
    let harness = Harness::new().await;
    harness.fetcher.stall();
    let invoker = invoker(Some(voice_channel()));

    play(&harness, "list:slow,slower").await;
    eventually("slow attached", || harness.output.attach_count() == 1).await;
    {
        let session = harness.registry.get(guild()).unwrap();
        assert!(session.lock().await.has_active_job());
    }
    assert_eq!(harness.temp_files(), 1);

    harness.manager.skip(guild(), &invoker).await;
    eventually("slower attached", || harness.output.attach_count() == 2).await;
    eventually("slow write discarded", || harness.temp_files() == 1).await;
    assert!(!harness.is_cached("slow"));

    harness.manager.leave(guild(), &invoker).await;
    eventually("slower write discarded", || harness.temp_files() == 0).await;
    assert!(!harness.is_cached("slower"));
}

#[tokio::test]
async fn test_source_failing_after_start_is_dropped_in_song_loop() {
    test_utils::init();
    let harness = Harness::new().await;
    set_loop(&harness, "song").await;
    harness.fetcher.fail_late_for(watch_url("broken"));

    play(&harness, "list:broken,fine").await;
    eventually("fine track attached", || harness.output.attach_count() == 1).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("fine"));

    eventually("failure announced", || {
        harness
            .announcer
            .messages()
            .iter()
            .any(|m| m.starts_with("Could not play **broken**") && m.contains("unavailable"))
    })
    .await;
    assert!(
        !harness
            .announcer
            .messages()
            .iter()
            .any(|m| m.starts_with("Now playing: **broken**"))
    );

    eventually("fine published", || harness.is_cached("fine")).await;
    harness.output.finish(0);
    eventually("fine replayed", || harness.output.attach_count() == 2).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("fine"));
    assert_eq!(harness.fetcher.fetches(), 2);
}

#[tokio::test]
async fn test_stream_cut_short_is_reported_and_not_looped() {
    test_utils::init();
    let harness = Harness::new().await;
    set_loop(&harness, "song").await;
    harness.fetcher.cut_short_for(watch_url("flaky"));

    play(&harness, "list:flaky,steady").await;
    eventually("flaky attached", || harness.output.attach_count() == 1).await;
    eventually("flaky stream drained", || harness.output.played(0).is_some()).await;

    // The player reaches the end of what it was given.
    harness.output.finish(0);
    eventually("steady attached", || harness.output.attach_count() == 2).await;
    assert_eq!(current_title(&harness).await.as_deref(), Some("steady"));

    eventually("cut short announced", || {
        harness
            .announcer
            .messages()
            .iter()
            .any(|m| m.starts_with("Playback of **flaky** was cut short"))
    })
    .await;
    assert_eq!(harness.fetcher.fetches(), 2);
    assert!(!harness.is_cached("flaky"));
}
