mod common;

use chrono::{Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio_test::{assert_err, assert_ok};

use common::{
    Harness, MockProvider, MockUpstream, SEGMENT_URL, VARIANT_URL, event, id_from_uri, live_event,
    test_config,
};
use sports_tuner::errors::SessionError;
use sports_tuner::streaming::{HeartbeatReaper, SessionState};

const BASE: &str = "http://tuner.test";

/// First line of `text` ending in `suffix`
fn uri_ending(text: &str, suffix: &str) -> String {
    text.lines()
        .find(|line| line.ends_with(suffix))
        .unwrap_or_else(|| panic!("no {suffix} line in:\n{text}"))
        .to_string()
}

#[tokio::test]
async fn test_concurrent_first_requests_share_one_launch() {
    let harness = Harness::new(
        test_config(),
        MockProvider::new("mock").with_delay(std::time::Duration::from_millis(50)),
        MockUpstream::with_stream(),
    )
    .await;
    harness.schedule_events(vec![live_event("mock", "live", 60)]).await;

    let results = join_all((0..10).map(|_| harness.sessions.ensure_launched(100, BASE))).await;
    let sessions: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(harness.provider.resolve_calls(), 1);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    assert_eq!(harness.sessions.state(100).await, SessionState::Live);
}

#[tokio::test]
async fn test_launch_rewrites_variants_to_chunklist_routes() {
    let harness = Harness::live().await;
    let session = harness.sessions.ensure_launched(100, BASE).await.unwrap();

    let chunklist = uri_ending(session.playlist(), ".m3u8");
    assert!(chunklist.starts_with("http://tuner.test/chunklist/100/"));
    assert!(!session.playlist().contains("low/index.m3u8"));
    assert_eq!(session.event().external_id, "live");
}

#[tokio::test]
async fn test_inline_media_playlist_is_wrapped_in_a_master() {
    let upstream = MockUpstream::with_stream();
    upstream.serve(common::MASTER_URL, common::MEDIA);
    let harness = Harness::new(
        test_config(),
        MockProvider::new("mock").with_inline_master(common::MEDIA),
        upstream,
    )
    .await;
    harness.schedule_events(vec![live_event("mock", "live", 60)]).await;

    let session = assert_ok!(harness.sessions.ensure_launched(100, BASE).await);
    assert!(session.playlist().contains("#EXT-X-STREAM-INF"));
    assert_eq!(harness.upstream.fetches(common::MASTER_URL), 0);

    // The lone variant is the media playlist itself, refreshed from upstream
    let chunklist_id = id_from_uri(&uri_ending(session.playlist(), ".m3u8"));
    let chunklist = assert_ok!(harness.sessions.get_chunklist(100, &chunklist_id).await);
    assert!(chunklist.contains("#EXTINF:6.0,"));
    assert_eq!(harness.upstream.fetches(common::MASTER_URL), 1);
}

#[tokio::test]
async fn test_failed_launch_stays_uninitialized_and_retries() {
    let harness = Harness::live().await;
    harness.provider.fail_resolve.store(true, Ordering::SeqCst);

    let err = assert_err!(harness.sessions.ensure_launched(100, BASE).await);
    assert!(matches!(err, SessionError::LaunchFailure { channel: 100, .. }));
    assert_eq!(harness.sessions.state(100).await, SessionState::Uninitialized);

    harness.provider.fail_resolve.store(false, Ordering::SeqCst);
    harness.sessions.ensure_launched(100, BASE).await.unwrap();
    assert_eq!(harness.provider.resolve_calls(), 2);
    assert_eq!(harness.sessions.state(100).await, SessionState::Live);
}

#[tokio::test]
async fn test_empty_channel_reports_no_scheduled_event() {
    let harness = Harness::live().await;
    let err = harness.sessions.ensure_launched(101, BASE).await.unwrap_err();
    assert_eq!(err.code(), "no-scheduled-event");
    assert_eq!(harness.provider.resolve_calls(), 0);
    assert_eq!(harness.sessions.state(101).await, SessionState::Uninitialized);
}

#[tokio::test]
async fn test_chunklist_and_segment_are_proxied() {
    let harness = Harness::live().await;
    let session = assert_ok!(harness.sessions.ensure_launched(100, BASE).await);
    let chunklist_id = id_from_uri(&uri_ending(session.playlist(), ".m3u8"));

    let chunklist = assert_ok!(harness.sessions.get_chunklist(100, &chunklist_id).await);
    assert!(chunklist.contains("#EXT-X-TARGETDURATION:6"));
    let segment = uri_ending(&chunklist, ".ts");
    assert!(segment.starts_with("http://tuner.test/channels/100/"));

    let part = assert_ok!(
        harness
            .sessions
            .get_segment_or_key(100, &id_from_uri(&segment))
            .await
    );
    assert_eq!(&part.bytes[..], b"segment-bytes");
    assert_eq!(part.content_type, "video/mp2t");
    assert_eq!(harness.upstream.fetches(SEGMENT_URL), 1);
}

#[tokio::test]
async fn test_concurrent_chunklist_requests_fetch_upstream_once() {
    let mut upstream = MockUpstream::with_stream();
    upstream.delay = std::time::Duration::from_millis(30);
    let harness = Harness::new(test_config(), MockProvider::new("mock"), upstream).await;
    harness.schedule_events(vec![live_event("mock", "live", 60)]).await;

    let session = harness.sessions.ensure_launched(100, BASE).await.unwrap();
    let chunklist_id = id_from_uri(&uri_ending(session.playlist(), ".m3u8"));

    let results = join_all((0..8).map(|_| harness.sessions.get_chunklist(100, &chunklist_id))).await;
    let bodies: Vec<String> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(bodies.iter().all(|body| body == &bodies[0]));
    assert_eq!(harness.upstream.fetches(VARIANT_URL), 1);
}

#[tokio::test]
async fn test_unknown_chunklist_and_part_ids() {
    let harness = Harness::live().await;
    harness.sessions.ensure_launched(100, BASE).await.unwrap();

    let err = harness.sessions.get_chunklist(100, "deadbeef").await.unwrap_err();
    assert_eq!(err.code(), "unknown-chunklist");
    let err = harness.sessions.get_segment_or_key(100, "deadbeef").await.unwrap_err();
    assert_eq!(err.code(), "unknown-part");
    assert_eq!(harness.sessions.state(100).await, SessionState::Live);
}

#[tokio::test]
async fn test_requests_before_launch_are_not_ready() {
    let harness = Harness::live().await;
    let err = harness.sessions.get_chunklist(100, "anything").await.unwrap_err();
    assert!(matches!(err, SessionError::NotReady { channel: 100 }));
}

#[tokio::test]
async fn test_repeated_upstream_failures_reset_the_session() {
    let harness = Harness::live().await;
    let session = harness.sessions.ensure_launched(100, BASE).await.unwrap();
    let chunklist_id = id_from_uri(&uri_ending(session.playlist(), ".m3u8"));

    harness.upstream.fail.store(true, Ordering::SeqCst);
    for _ in 0..2 {
        let err = harness.sessions.get_chunklist(100, &chunklist_id).await.unwrap_err();
        assert!(matches!(err, SessionError::UpstreamUnavailable { .. }));
        assert_eq!(harness.sessions.state(100).await, SessionState::Live);
    }
    let err = harness.sessions.get_chunklist(100, &chunklist_id).await.unwrap_err();
    assert!(matches!(err, SessionError::UpstreamUnavailable { .. }));
    assert_eq!(harness.sessions.state(100).await, SessionState::Uninitialized);

    // Next tune-in launches afresh
    harness.upstream.fail.store(false, Ordering::SeqCst);
    harness.sessions.ensure_launched(100, BASE).await.unwrap();
    assert_eq!(harness.provider.resolve_calls(), 2);
}

#[tokio::test]
async fn test_ended_event_relaunches_with_next_event() {
    let harness = Harness::new(test_config(), MockProvider::new("mock"), MockUpstream::with_stream()).await;
    let now = Utc::now();
    harness
        .schedule_events(vec![
            event("mock", "first", now - Duration::minutes(5), now + Duration::minutes(10)),
            event("mock", "second", now + Duration::minutes(10), now + Duration::minutes(70)),
        ])
        .await;

    let first = harness.sessions.ensure_launched_at(100, BASE, now).await.unwrap();
    assert_eq!(first.event().external_id, "first");

    let later = now + Duration::minutes(15);
    let second = harness.sessions.ensure_launched_at(100, BASE, later).await.unwrap();
    assert_eq!(second.event().external_id, "second");
    assert_eq!(harness.provider.resolve_calls(), 2);
}

#[tokio::test]
async fn test_reaper_evicts_only_after_idle_timeout() {
    let harness = Harness::live().await;
    let reaper = HeartbeatReaper::new(harness.sessions.clone(), std::time::Duration::from_secs(120));
    let now = Utc::now();
    harness.sessions.ensure_launched_at(100, BASE, now).await.unwrap();

    assert!(reaper.sweep(now + Duration::seconds(119)).await.is_empty());

    // A heartbeat keeps pushing eviction out
    harness
        .sessions
        .ensure_launched_at(100, BASE, now + Duration::seconds(100))
        .await
        .unwrap();
    assert!(reaper.sweep(now + Duration::seconds(200)).await.is_empty());
    assert_eq!(harness.sessions.state(100).await, SessionState::Live);

    assert_eq!(reaper.sweep(now + Duration::seconds(221)).await, vec![100]);
    assert_eq!(harness.sessions.state(100).await, SessionState::Uninitialized);
}

#[tokio::test]
async fn test_reaper_evicts_sessions_whose_event_ended() {
    let harness = Harness::live().await;
    let reaper = HeartbeatReaper::new(harness.sessions.clone(), std::time::Duration::from_secs(3600 * 24));
    let now = Utc::now();
    harness.sessions.ensure_launched_at(100, BASE, now).await.unwrap();

    assert!(reaper.sweep(now + Duration::minutes(30)).await.is_empty());
    assert_eq!(reaper.sweep(now + Duration::minutes(61)).await, vec![100]);
}

#[tokio::test]
async fn test_reset_discards_one_channel() {
    let harness = Harness::new(test_config(), MockProvider::new("mock"), MockUpstream::with_stream()).await;
    harness
        .schedule_events(vec![live_event("mock", "a", 60), live_event("mock", "b", 60)])
        .await;
    harness.sessions.ensure_launched(100, BASE).await.unwrap();
    harness.sessions.ensure_launched(101, BASE).await.unwrap();

    assert!(harness.sessions.reset(100).await);
    assert!(!harness.sessions.reset(100).await);
    assert_eq!(harness.sessions.state(100).await, SessionState::Uninitialized);
    assert_eq!(harness.sessions.state(101).await, SessionState::Live);

    let status = harness.sessions.status(Utc::now()).await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].channel, 101);
}

#[tokio::test]
async fn test_get_playlist_serves_the_cached_top_level() {
    let harness = Harness::live().await;
    let err = assert_err!(harness.sessions.get_playlist(100).await);
    assert!(matches!(err, SessionError::NotReady { channel: 100 }));

    let session = harness.sessions.ensure_launched(100, BASE).await.unwrap();
    let playlist = assert_ok!(harness.sessions.get_playlist(100).await);
    assert_eq!(playlist, session.playlist());
    assert_eq!(harness.provider.resolve_calls(), 1);
}

#[tokio::test]
async fn test_removed_provider_stops_serving_its_session() {
    let harness = Harness::live().await;
    harness.sessions.ensure_launched(100, BASE).await.unwrap();

    harness.schedule.remove_provider("mock").await;

    let err = assert_err!(harness.sessions.get_playlist(100).await);
    assert!(matches!(err, SessionError::NotReady { channel: 100 }));
    assert_eq!(harness.sessions.state(100).await, SessionState::Uninitialized);

    let err = assert_err!(harness.sessions.ensure_launched(100, BASE).await);
    assert_eq!(err.code(), "no-scheduled-event");
    assert_eq!(harness.provider.resolve_calls(), 1);
}

#[tokio::test]
async fn test_shortened_event_is_not_served_past_its_new_end() {
    let harness = Harness::live().await;
    let session = harness.sessions.ensure_launched(100, BASE).await.unwrap();
    let chunklist_id = id_from_uri(&uri_ending(session.playlist(), ".m3u8"));

    // Re-fetch reports the event finished a minute ago
    let now = Utc::now();
    harness
        .schedule_events(vec![event(
            "mock",
            "live",
            now - Duration::minutes(5),
            now - Duration::minutes(1),
        )])
        .await;

    let err = assert_err!(harness.sessions.get_chunklist(100, &chunklist_id).await);
    assert!(matches!(err, SessionError::NotReady { channel: 100 }));
    let err = assert_err!(harness.sessions.ensure_launched(100, BASE).await);
    assert_eq!(err.code(), "no-scheduled-event");
    assert_eq!(harness.provider.resolve_calls(), 1);
}

#[tokio::test]
async fn test_abandoned_launch_completes_and_is_checked_on_reuse() {
    let harness = Harness::new(
        test_config(),
        MockProvider::new("mock").with_delay(std::time::Duration::from_millis(50)),
        MockUpstream::with_stream(),
    )
    .await;
    let now = Utc::now();
    harness
        .schedule_events(vec![
            event("mock", "first", now - Duration::minutes(5), now + Duration::minutes(10)),
            event("mock", "second", now + Duration::minutes(10), now + Duration::minutes(70)),
        ])
        .await;

    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(5),
        harness.sessions.ensure_launched_at(100, BASE, now),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_eq!(harness.sessions.state(100).await, SessionState::Live);

    let later = now + Duration::minutes(15);
    let session = assert_ok!(harness.sessions.ensure_launched_at(100, BASE, later).await);
    assert_eq!(session.event().external_id, "second");
    assert_eq!(harness.provider.resolve_calls(), 2);
}

#[tokio::test]
async fn test_stalled_launch_is_reaped() {
    let harness = Harness::new(
        test_config(),
        MockProvider::new("mock").with_delay(std::time::Duration::from_secs(3600)),
        MockUpstream::with_stream(),
    )
    .await;
    harness.schedule_events(vec![live_event("mock", "live", 60)]).await;
    let reaper = HeartbeatReaper::new(harness.sessions.clone(), std::time::Duration::from_secs(120));
    let now = Utc::now();

    let pending = tokio::time::timeout(
        std::time::Duration::from_millis(10),
        harness.sessions.ensure_launched_at(100, BASE, now),
    )
    .await;
    assert!(pending.is_err());
    assert_eq!(harness.sessions.state(100).await, SessionState::Launching);

    // Default upstream timeout is 30s; a launch gets two of them
    assert!(reaper.sweep(now + Duration::seconds(30)).await.is_empty());
    assert_eq!(reaper.sweep(now + Duration::minutes(2)).await, vec![100]);
    assert_eq!(harness.sessions.state(100).await, SessionState::Uninitialized);
}

#[tokio::test]
async fn test_chunklist_is_cached_for_its_freshness_window() {
    let mut config = test_config();
    config.timers.chunklist_max_age = std::time::Duration::from_millis(100);
    let harness = Harness::new(config, MockProvider::new("mock"), MockUpstream::with_stream()).await;
    harness.schedule_events(vec![live_event("mock", "live", 60)]).await;
    let session = harness.sessions.ensure_launched(100, BASE).await.unwrap();
    let chunklist_id = id_from_uri(&uri_ending(session.playlist(), ".m3u8"));

    let first = assert_ok!(harness.sessions.get_chunklist(100, &chunklist_id).await);
    let second = assert_ok!(harness.sessions.get_chunklist(100, &chunklist_id).await);
    assert_eq!(first, second);
    assert_eq!(harness.upstream.fetches(VARIANT_URL), 1);

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_ok!(harness.sessions.get_chunklist(100, &chunklist_id).await);
    assert_eq!(harness.upstream.fetches(VARIANT_URL), 2);
}

#[tokio::test]
async fn test_chunklist_and_part_requests_advance_the_heartbeat() {
    let harness = Harness::live().await;
    let reaper = HeartbeatReaper::new(harness.sessions.clone(), std::time::Duration::from_secs(120));
    let launched_at = Utc::now() - Duration::seconds(100);
    let session = harness.sessions.ensure_launched_at(100, BASE, launched_at).await.unwrap();
    let heartbeat_millis = || session.heartbeat().map(|hb| hb.timestamp_millis()).unwrap_or_default();
    assert_eq!(heartbeat_millis(), launched_at.timestamp_millis());

    let before_chunklist = Utc::now();
    let chunklist_id = id_from_uri(&uri_ending(session.playlist(), ".m3u8"));
    let chunklist = assert_ok!(harness.sessions.get_chunklist(100, &chunklist_id).await);
    assert!(heartbeat_millis() >= before_chunklist.timestamp_millis());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let before_part = Utc::now();
    let segment = id_from_uri(&uri_ending(&chunklist, ".ts"));
    assert_ok!(harness.sessions.get_segment_or_key(100, &segment).await);
    assert!(heartbeat_millis() >= before_part.timestamp_millis());

    // Idle since launch would be 130s by now; the requests kept it alive
    assert!(reaper.sweep(launched_at + Duration::seconds(130)).await.is_empty());
}
