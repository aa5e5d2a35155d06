//! Shared runtime state for resv-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The live view feeds
//! the SSE bus from one background subscription, started by
//! [`spawn_live_view`].

use std::sync::Arc;
use std::time::Duration;

use resv_engine::{LiveView, ReservationError, ReservationService, Snapshot, Subscription};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::api_types::ReservationView;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    /// Complete sorted reservation list; never a delta.
    Snapshot {
        count: usize,
        reservations: Vec<ReservationView>,
    },
    /// A live-view refresh failed; the next change retries.
    LiveViewError {
        error: String,
        message: String,
    },
}

impl BusMsg {
    pub fn snapshot(snapshot: &Snapshot) -> Self {
        BusMsg::Snapshot {
            count: snapshot.len(),
            reservations: snapshot.iter().cloned().map(ReservationView::from).collect(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Snapshot { .. } => "snapshot",
            BusMsg::LiveViewError { .. } => "live_view_error",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo / StatusSnapshot
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub backend: String,
    pub max_commit_attempts: u32,
    /// Hash of the effective config, when one was loaded.
    pub config_hash: Option<String>,
    /// Reservations in the last live-view snapshot; `None` before the first.
    pub live_view_reservations: Option<usize>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub service: ReservationService,
    /// Owned here so the stream handler can replay the cached snapshot.
    pub live_view: LiveView,
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub config_hash: Option<String>,
}

impl AppState {
    pub fn new(service: ReservationService) -> Self {
        Self::with_bus_capacity(service, DEFAULT_BUS_CAPACITY)
    }

    pub fn with_bus_capacity(service: ReservationService, capacity: usize) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(capacity.max(1));
        Self {
            live_view: service.live_view(),
            service,
            bus,
            build: BuildInfo {
                service: "resv-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            config_hash: None,
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            backend: self.service.store().backend().to_string(),
            max_commit_attempts: self.service.config().max_commit_attempts,
            config_hash: self.config_hash.clone(),
            live_view_reservations: self.live_view.cached().map(|s| s.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Subscribe the shared live view and forward every snapshot (and refresh
/// failure) onto the bus. Keep the returned handle alive for as long as the
/// stream should run.
pub async fn spawn_live_view(state: &AppState) -> Result<Subscription, ReservationError> {
    let on_change = {
        let bus = state.bus.clone();
        move |snapshot: Snapshot| {
            let _ = bus.send(BusMsg::snapshot(&snapshot));
        }
    };
    let on_error = {
        let bus = state.bus.clone();
        move |e: ReservationError| {
            let _ = bus.send(BusMsg::LiveViewError {
                error: e.kind().to_string(),
                message: e.to_string(),
            });
        }
    };
    state.live_view.subscribe(on_change, on_error).await
}
