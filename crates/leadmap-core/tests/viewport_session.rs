// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

mod common;

use common::{init_logging, record, region, Call, MockBackend, RecordingSurface};
use leadmap_core::cache::ClusterKey;
use leadmap_core::config::ViewportConfig;
use leadmap_core::filter::RecordFilter;
use leadmap_core::geo::LatLng;
use leadmap_core::session::{MapEvent, MapSession};
use leadmap_core::viewport::Camera;
use leadmap_core::zoom::{DisplayMode, ResolutionBucket, GLOBAL_BUCKET};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

type Session = MapSession<MockBackend, RecordingSurface>;

fn session(backend: MockBackend) -> Session {
    init_logging();
    MapSession::new(backend, RecordingSurface::default(), ViewportConfig::default())
}

/// Feeds `script` into the session with the given pauses, then closes the
/// channel and lets the session drain.
async fn drive(session: &mut Session, script: Vec<(MapEvent, Duration)>) {
    let (tx, rx) = mpsc::channel(32);
    let feeder = async move {
        for (event, pause) in script {
            tx.send(event).await.unwrap();
            sleep(pause).await;
        }
    };
    tokio::join!(session.run(rx), feeder);
}

#[tokio::test(start_paused = true)]
async fn test_zoom_five_requests_global_clusters() {
    let mut s = session(MockBackend::default());
    let camera = Camera::new(5.0, region(30.0, -120.0, 45.0, -95.0));
    drive(&mut s, vec![(MapEvent::Idle(camera), Duration::from_secs(1))]).await;

    let queries = s.backend().cluster_calls();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].bucket, GLOBAL_BUCKET);
    assert!(queries[0].bounds.is_none());

    let params = serde_json::to_value(queries[0].rpc_params()).unwrap();
    assert_eq!(params["p_zoom_level"], 5);
    assert!(params["p_min_lat"].is_null());

    assert_eq!(s.controller().markers().len(), 5);
    assert_eq!(s.surface().marker_count, 5);
}

#[tokio::test(start_paused = true)]
async fn test_zoom_burst_issues_single_record_fetch() {
    let mut s = session(MockBackend::default());
    let wide = region(40.0, -112.0, 41.0, -111.0);
    let street = region(40.50, -111.60, 40.52, -111.58);
    drive(
        &mut s,
        vec![
            (MapEvent::Idle(Camera::new(9.0, wide)), Duration::from_millis(200)),
            (MapEvent::ZoomChanged(Camera::new(13.0, street)), Duration::from_secs(2)),
        ],
    )
    .await;

    assert!(s.backend().cluster_calls().is_empty());
    let records = s.backend().record_calls();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].region, street.expand(3.0));
    assert_eq!(s.stats().evaluations, 1);
    assert_eq!(s.controller().mode(), Some(DisplayMode::Individual));
}

#[tokio::test(start_paused = true)]
async fn test_panning_inside_covered_box_is_free() {
    let backend = MockBackend {
        records: vec![record(1, 45.0, -105.0), record(2, 42.0, -108.0)],
        ..MockBackend::default()
    };
    let mut s = session(backend);
    // Expanded threefold this viewport covers 40..50 by -110..-100.
    let first = region(44.0, -106.0, 46.0, -104.0);
    drive(
        &mut s,
        vec![
            (MapEvent::Idle(Camera::new(13.0, first)), Duration::from_secs(1)),
            (
                MapEvent::Idle(Camera::new(13.0, region(41.0, -109.0, 43.0, -107.0))),
                Duration::from_secs(1),
            ),
            (
                MapEvent::Idle(Camera::new(14.0, region(47.0, -103.0, 49.0, -101.0))),
                Duration::from_secs(1),
            ),
        ],
    )
    .await;

    assert_eq!(s.backend().calls().len(), 1);
    assert_eq!(s.stats().evaluations, 3);
    assert_eq!(s.controller().markers().record_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_does_not_overwrite_newer_markers() {
    let backend = MockBackend::default()
        .with_delays(&[Duration::from_secs(3), Duration::from_millis(100)]);
    let mut s = session(backend);
    let view = region(40.0, -112.0, 41.0, -111.0);
    drive(
        &mut s,
        vec![
            (MapEvent::Idle(Camera::new(9.0, view)), Duration::from_millis(600)),
            (MapEvent::Idle(Camera::new(10.5, view)), Duration::from_secs(5)),
        ],
    )
    .await;

    let queries = s.backend().cluster_calls();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].bucket, ResolutionBucket(6));
    assert_eq!(queries[1].bucket, ResolutionBucket(8));

    assert_eq!(s.stats().stale_discarded, 1);
    assert_eq!(s.controller().markers().len(), 8);
    let stale_key = ClusterKey::new(ResolutionBucket(6), &view.expand(2.0));
    assert!(!s.controller().cluster_cache().contains(&stale_key));
}

#[tokio::test(start_paused = true)]
async fn test_zooming_back_drops_pending_bucket() {
    let backend = MockBackend::default()
        .with_delays(&[Duration::from_millis(100), Duration::from_secs(3)]);
    let mut s = session(backend);
    let view = region(40.0, -112.0, 41.0, -111.0);
    drive(
        &mut s,
        vec![
            (MapEvent::Idle(Camera::new(9.0, view)), Duration::from_secs(1)),
            (MapEvent::Idle(Camera::new(10.5, view)), Duration::from_secs(1)),
            (MapEvent::Idle(Camera::new(9.0, view)), Duration::from_secs(5)),
        ],
    )
    .await;

    let queries = s.backend().cluster_calls();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[1].bucket, ResolutionBucket(8));
    assert_eq!(s.stats().stale_discarded, 1);
    assert_eq!(s.controller().markers().len(), 6);
    assert_eq!(s.surface().marker_count, 6);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_markers_and_shows_banner() {
    let backend = MockBackend {
        failing_bucket: Some(6),
        ..MockBackend::default()
    };
    let mut s = session(backend);
    let view = region(40.0, -112.0, 41.0, -111.0);
    drive(
        &mut s,
        vec![
            (MapEvent::Idle(Camera::new(5.0, view)), Duration::from_secs(1)),
            (MapEvent::Idle(Camera::new(9.0, view)), Duration::from_secs(1)),
        ],
    )
    .await;

    assert_eq!(s.banner(), Some("Failed to load clusters."));
    assert_eq!(s.controller().markers().len(), 5);
    assert_eq!(s.surface().marker_count, 5);
}

#[tokio::test(start_paused = true)]
async fn test_unready_bounds_never_reach_backend() {
    let mut s = session(MockBackend::default());
    let camera = Camera {
        zoom: 9.0,
        bounds: None,
    };
    drive(&mut s, vec![(MapEvent::Idle(camera), Duration::from_secs(1))]).await;
    assert!(s.backend().calls().is_empty());
    assert!(s.banner().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_filters_refetch_and_replace_records() {
    let backend = MockBackend {
        records: vec![record(1, 40.51, -111.59), record(2, 40.515, -111.585)],
        ..MockBackend::default()
    };
    let mut s = session(backend);
    let street = region(40.50, -111.60, 40.52, -111.58);
    drive(
        &mut s,
        vec![
            (MapEvent::Idle(Camera::new(14.0, street)), Duration::from_secs(1)),
            (
                MapEvent::ApplyFilters(vec![RecordFilter::new("status", ">=", "2")]),
                Duration::from_secs(1),
            ),
        ],
    )
    .await;

    let records = s.backend().record_calls();
    assert_eq!(records.len(), 2);
    assert!(records[0].filters.is_empty());
    assert!(records[1]
        .query_pairs()
        .contains(&("status".to_string(), "gte.2".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_cluster_click_moves_camera_two_levels_in() {
    let mut s = session(MockBackend::default());
    let view = region(40.0, -112.0, 41.0, -111.0);
    drive(
        &mut s,
        vec![
            (MapEvent::Idle(Camera::new(7.0, view)), Duration::from_secs(1)),
            (MapEvent::ClusterClicked(LatLng::new(40.3, -111.4)), Duration::ZERO),
        ],
    )
    .await;

    let moves = &s.surface().moves;
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].zoom, 9.0);
    assert_eq!(moves[0].center, LatLng::new(40.3, -111.4));
}

#[tokio::test(start_paused = true)]
async fn test_channel_close_flushes_pending_evaluation() {
    let mut s = session(MockBackend::default());
    let view = region(40.0, -112.0, 41.0, -111.0);
    drive(&mut s, vec![(MapEvent::Idle(Camera::new(9.0, view)), Duration::ZERO)]).await;
    assert_eq!(s.stats().evaluations, 1);
    assert!(matches!(s.backend().calls()[0], Call::Clusters(_)));
    assert_eq!(s.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_event_flushes_pending_evaluation() {
    let mut s = session(MockBackend::default());
    let view = region(40.0, -112.0, 41.0, -111.0);
    let now = Instant::now();
    s.handle_event(MapEvent::Idle(Camera::new(9.0, view)), now);
    s.handle_event(MapEvent::Shutdown, now);
    assert_eq!(s.stats().evaluations, 1);
    assert_eq!(s.in_flight(), 1);

    s.settle().await;
    assert_eq!(s.controller().markers().len(), 6);
}
