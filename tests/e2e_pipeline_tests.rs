//! End-to-end tests for the playlist analysis pipeline.
//!
//! Drive `PlaylistAnalyzer` through scripted upstream fakes with real WAV
//! preview audio, so decode, extraction, normalization, aggregation and
//! classification all run for real.

mod common;

use common::{
    build_analyzer, click_wav, credential, init_tracing, silent_wav, sine_wav, track,
    FakeMusicService, FakePreviewFetcher, PreviewBehavior, RefreshBehavior,
};
use moodscope::analyzer::aggregate::TrackFeatureRecord;
use moodscope::mood::MoodCategory;
use moodscope::upstream::MusicServiceError;
use moodscope::{AnalyzeError, AnalyzerSettings, CredentialStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const PLAYLIST: &str = "p1";
const USER: &str = "u1";

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
async fn test_playlist_analysis_happy_path() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(
        PLAYLIST,
        "Road Trip",
        vec![
            track("t1", Some("https://previews/t1")),
            track("t2", Some("https://previews/t2")),
            track("t3", Some("https://previews/t3")),
        ],
    ));
    let previews = Arc::new(
        FakePreviewFetcher::new()
            .with_response("https://previews/t1", PreviewBehavior::Bytes(click_wav(120.0, 12.0)))
            .with_response("https://previews/t2", PreviewBehavior::Bytes(click_wav(90.0, 12.0)))
            .with_response("https://previews/t3", PreviewBehavior::Bytes(sine_wav(440.0, 12.0))),
    );
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let result = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.playlist_id, PLAYLIST);
    assert_eq!(result.playlist_name, "Road Trip");
    assert!(!result.analysis_id.is_empty());
    assert_eq!(result.track_count, 3);
    assert_eq!(result.raw_features.len(), 3);
    assert!(result
        .raw_features
        .iter()
        .all(|r| matches!(r, TrackFeatureRecord::Analyzed(_))));

    // Verdict fields are consistent with each other.
    let expected_mood = match result.mood_category {
        MoodCategory::Upbeat => "Happy & Energetic",
        MoodCategory::Chill => "Calm & Content",
        MoodCategory::Intense => "Tense & Energetic",
        MoodCategory::Melancholic => "Sad & Mellow",
    };
    assert_eq!(result.primary_mood, expected_mood);
    assert!((30.0..=100.0).contains(&result.confidence));
    assert_eq!(result.top_tracks.len(), 3);

    for value in [
        result.averages.valence,
        result.averages.energy,
        result.averages.danceability,
        result.averages.acousticness,
        result.averages.instrumentalness,
    ] {
        assert!((0.0..=1.0).contains(&value), "average out of range: {value}");
    }
    assert!(result.averages.tempo_bpm >= 60.0 && result.averages.tempo_bpm <= 200.0);
}

#[tokio::test]
async fn test_partial_failures_keep_their_slots() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(
        PLAYLIST,
        "Mixed Bag",
        vec![
            track("t1", Some("https://previews/t1")),
            track("t2", None),
            track("t3", Some("https://previews/t3")),
            track("t4", Some("https://previews/t4")),
        ],
    ));
    let previews = Arc::new(
        FakePreviewFetcher::new()
            .with_response("https://previews/t1", PreviewBehavior::Bytes(click_wav(120.0, 12.0)))
            .with_response("https://previews/t3", PreviewBehavior::NotFound)
            .with_response("https://previews/t4", PreviewBehavior::Bytes(click_wav(100.0, 12.0))),
    );
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let result = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.track_count, 2);
    assert_eq!(result.raw_features.len(), 4);

    match &result.raw_features[1] {
        TrackFeatureRecord::Unavailable { track_id, reason } => {
            assert_eq!(track_id, "t2");
            assert_eq!(reason, "track has no preview audio");
        }
        other => panic!("expected unavailable slot for t2, got {other:?}"),
    }
    match &result.raw_features[2] {
        TrackFeatureRecord::Unavailable { track_id, reason } => {
            assert_eq!(track_id, "t3");
            assert_eq!(reason, "preview fetch failed: preview no longer available");
        }
        other => panic!("expected unavailable slot for t3, got {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_and_short_previews_fail_locally() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(
        PLAYLIST,
        "Broken Previews",
        vec![
            track("t1", Some("https://previews/t1")),
            track("t2", Some("https://previews/t2")),
            track("t3", Some("https://previews/t3")),
        ],
    ));
    let previews = Arc::new(
        FakePreviewFetcher::new()
            .with_response("https://previews/t1", PreviewBehavior::Bytes(silent_wav(12.0)))
            .with_response("https://previews/t2", PreviewBehavior::Bytes(sine_wav(440.0, 4.0)))
            .with_response("https://previews/t3", PreviewBehavior::Bytes(click_wav(110.0, 12.0))),
    );
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let result = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap();

    // Only the click track survives; the silent and too-short clips fail
    // without sinking the run.
    assert_eq!(result.track_count, 1);
    assert!(matches!(
        &result.raw_features[0],
        TrackFeatureRecord::Unavailable { reason, .. } if reason.contains("silent")
    ));
    assert!(matches!(
        &result.raw_features[1],
        TrackFeatureRecord::Unavailable { reason, .. } if reason.contains("insufficient audio")
    ));
}

#[tokio::test]
async fn test_all_tracks_failed_is_aggregation_empty() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(
        PLAYLIST,
        "Dead Links",
        vec![
            track("t1", Some("https://previews/t1")),
            track("t2", None),
        ],
    ));
    let previews = Arc::new(
        FakePreviewFetcher::new().with_response("https://previews/t1", PreviewBehavior::NotFound),
    );
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let err = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzeError::Empty(_)));
    assert_eq!(err.to_string(), "no tracks could be analyzed");
}

#[tokio::test]
async fn test_empty_playlist_is_aggregation_empty() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(PLAYLIST, "Empty", vec![]));
    let previews = Arc::new(FakePreviewFetcher::new());
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let err = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzeError::Empty(_)));
}

// ============================================================================
// Ordering and cancellation
// ============================================================================

#[tokio::test]
async fn test_results_stay_in_playlist_order_under_delays() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(
        PLAYLIST,
        "Out Of Order",
        vec![
            track("slow", Some("https://previews/slow")),
            track("medium", Some("https://previews/medium")),
            track("fast", Some("https://previews/fast")),
        ],
    ));
    // The first playlist entry completes last.
    let previews = Arc::new(
        FakePreviewFetcher::new()
            .with_response(
                "https://previews/slow",
                PreviewBehavior::DelayedBytes(click_wav(120.0, 12.0), Duration::from_millis(300)),
            )
            .with_response(
                "https://previews/medium",
                PreviewBehavior::DelayedBytes(click_wav(100.0, 12.0), Duration::from_millis(100)),
            )
            .with_response("https://previews/fast", PreviewBehavior::Bytes(click_wav(80.0, 12.0))),
    );
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let result = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = result
        .raw_features
        .iter()
        .map(|r| match r {
            TrackFeatureRecord::Analyzed(f) => f.track_id.as_str(),
            TrackFeatureRecord::Unavailable { track_id, .. } => track_id.as_str(),
        })
        .collect();
    assert_eq!(ids, vec!["slow", "medium", "fast"]);
}

#[tokio::test]
async fn test_cancellation_stops_the_run_promptly() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(
        PLAYLIST,
        "Never Finishes",
        vec![
            track("t1", Some("https://previews/t1")),
            track("t2", Some("https://previews/t2")),
        ],
    ));
    let previews = Arc::new(
        FakePreviewFetcher::new()
            .with_response(
                "https://previews/t1",
                PreviewBehavior::DelayedBytes(click_wav(120.0, 12.0), Duration::from_secs(5)),
            )
            .with_response(
                "https://previews/t2",
                PreviewBehavior::DelayedBytes(click_wav(100.0, 12.0), Duration::from_secs(5)),
            ),
    );
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = analyzer
        .analyze_playlist(USER, PLAYLIST, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyzeError::Cancelled));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "cancellation took {:?}",
        started.elapsed()
    );
}

// ============================================================================
// Authorization and upstream failures
// ============================================================================

#[tokio::test]
async fn test_missing_credential_is_auth_expired() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(PLAYLIST, "No Auth", vec![]));
    let previews = Arc::new(FakePreviewFetcher::new());
    let (analyzer, _store) = build_analyzer(music, previews, AnalyzerSettings::default());

    let err = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzeError::AuthExpired { ref user_id } if user_id == USER));
}

#[tokio::test]
async fn test_stale_credential_refreshes_once_and_proceeds() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(
        PLAYLIST,
        "Stale Token",
        vec![track("t1", Some("https://previews/t1"))],
    ));
    let previews = Arc::new(
        FakePreviewFetcher::new()
            .with_response("https://previews/t1", PreviewBehavior::Bytes(click_wav(120.0, 12.0))),
    );
    let (analyzer, store) = build_analyzer(music.clone(), previews, AnalyzerSettings::default());
    // Expires inside the 60s refresh skew.
    store.save(credential(USER, 10)).await;

    let result = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.track_count, 1);
    assert_eq!(music.refresh_calls.load(Ordering::SeqCst), 1);
    let refreshed = store.load(USER).await.unwrap();
    assert_eq!(refreshed.access_token, "access-refreshed-0");
}

#[tokio::test]
async fn test_rejected_refresh_is_auth_expired_and_forgets_credential() {
    init_tracing();
    let music = Arc::new(
        FakeMusicService::new(PLAYLIST, "Revoked", vec![])
            .with_refresh_behavior(RefreshBehavior::Reject),
    );
    let previews = Arc::new(FakePreviewFetcher::new());
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 10)).await;

    let err = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyzeError::AuthExpired { .. }));
    assert!(store.load(USER).await.is_none());
}

#[tokio::test]
async fn test_rate_limited_listing_surfaces_retry_after() {
    init_tracing();
    let music = Arc::new(
        FakeMusicService::new(PLAYLIST, "Throttled", vec![track("t1", None)]).with_list_error(
            MusicServiceError::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            },
        ),
    );
    let previews = Arc::new(FakePreviewFetcher::new());
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let err = analyzer
        .analyze_playlist(USER, PLAYLIST, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalyzeError::RateLimited {
            retry_after: Some(d)
        } if d == Duration::from_secs(30)
    ));
}

#[tokio::test]
async fn test_unknown_playlist_is_not_found() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(PLAYLIST, "Exists", vec![]));
    let previews = Arc::new(FakePreviewFetcher::new());
    let (analyzer, store) = build_analyzer(music, previews, AnalyzerSettings::default());
    store.save(credential(USER, 3600)).await;

    let err = analyzer
        .analyze_playlist(USER, "does-not-exist", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalyzeError::PlaylistNotFound(ref id) if id == "does-not-exist"
    ));
}

// ============================================================================
// Single preview analysis
// ============================================================================

#[tokio::test]
async fn test_analyze_preview_returns_track_mood() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(PLAYLIST, "Unused", vec![]));
    let previews = Arc::new(
        FakePreviewFetcher::new()
            .with_response("https://previews/solo", PreviewBehavior::Bytes(click_wav(128.0, 12.0))),
    );
    let (analyzer, _store) = build_analyzer(music, previews, AnalyzerSettings::default());

    let result = analyzer
        .analyze_preview("solo", "https://previews/solo")
        .await
        .unwrap();

    assert_eq!(result.features.track_id, "solo");
    assert!((0.0..=1.0).contains(&result.features.valence));
    assert!((0.0..=1.0).contains(&result.features.energy));
    assert!(!result.mood.is_empty());
}

#[tokio::test]
async fn test_analyze_preview_surfaces_fetch_failure() {
    init_tracing();
    let music = Arc::new(FakeMusicService::new(PLAYLIST, "Unused", vec![]));
    let previews = Arc::new(FakePreviewFetcher::new());
    let (analyzer, _store) = build_analyzer(music, previews, AnalyzerSettings::default());

    let err = analyzer
        .analyze_preview("gone", "https://previews/gone")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "preview fetch failed: preview no longer available");
}
