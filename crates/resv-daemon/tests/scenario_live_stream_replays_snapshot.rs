//! The SSE stream replays the cached live-view snapshot on connect and then
//! forwards a fresh, complete snapshot after every write.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use resv_daemon::{routes, state};
use resv_engine::{ReservationDraft, ReservationService};
use resv_interval::TimeWindow;
use resv_store::MemoryStore;
use tower::ServiceExt;

async fn next_event(body: &mut axum::body::Body, name: &str) -> String {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut buf = String::new();
    loop {
        let frame = tokio::time::timeout_at(deadline, body.frame())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("frame error");
        if let Ok(data) = frame.into_data() {
            buf.push_str(&String::from_utf8_lossy(&data));
        }
        // SSE events are separated by a blank line.
        while let Some(end) = buf.find("\n\n") {
            let event: String = buf.drain(..end + 2).collect();
            if event.contains(&format!("event: {name}")) {
                return event;
            }
        }
    }
}

#[tokio::test]
async fn scenario_live_stream_replays_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let service = ReservationService::new(store);
    let date = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
    service
        .create_reservation(&ReservationDraft::booking(
            date,
            TimeWindow::new(600, 780).unwrap(),
        ))
        .await
        .unwrap();

    let st = Arc::new(state::AppState::new(service.clone()));
    let _live = state::spawn_live_view(&st).await.unwrap();

    // Wait for the first delivery to populate the cache.
    for _ in 0..100 {
        if st.live_view.cached().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(st.live_view.cached().map(|s| s.len()), Some(1));

    let resp = routes::build_router(Arc::clone(&st))
        .oneshot(
            Request::builder()
                .uri("/v1/stream")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let mut body = resp.into_body();

    let replay = next_event(&mut body, "snapshot").await;
    assert!(replay.contains("\"count\":1"), "replay: {replay}");

    service
        .create_reservation(&ReservationDraft::booking(
            date,
            TimeWindow::new(780, 900).unwrap(),
        ))
        .await
        .unwrap();

    // The first delivery may still be in flight on the bus; skip it.
    let mut fresh = next_event(&mut body, "snapshot").await;
    while fresh.contains("\"count\":1") {
        fresh = next_event(&mut body, "snapshot").await;
    }
    assert!(fresh.contains("\"count\":2"), "fresh: {fresh}");

    let (status, json) = {
        let resp = routes::build_router(Arc::clone(&st))
            .oneshot(
                Request::builder()
                    .uri("/v1/status")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    };
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["live_view_reservations"], 2);
}
