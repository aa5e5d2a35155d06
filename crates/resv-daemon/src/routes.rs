//! Axum router and all HTTP handlers for resv-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers so tests can drive the bare router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use futures_util::{stream, Stream, StreamExt};
use resv_engine::{
    amount_from_input, summarize_month, LineItemDraft, ReservationDraft, ReservationError,
    ReservationFilter,
};
use resv_interval::TimeWindow;
use resv_schemas::{ReservationKind, ReservationStatus};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        CatalogEntryView, CatalogListResponse, ErrorResponse, HealthResponse, ListQuery,
        MonthQuery, PaymentRequest, ProposeRequest, ProposeResponse, ReservationListResponse,
        ReservationRequest, ReservationView, ReviseRequest, StatusChangeRequest,
    },
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream_handler))
        .route(
            "/v1/reservations",
            get(list_reservations).post(create_reservation),
        )
        .route("/v1/reservations/propose", post(propose_reservation))
        .route(
            "/v1/reservations/:id",
            get(get_reservation).delete(delete_reservation),
        )
        .route("/v1/reservations/:id/payments", post(receive_payment))
        .route("/v1/reservations/:id/status", post(update_status))
        .route("/v1/reservations/:id/revise", post(revise_booking))
        .route("/v1/reservations/:id/distribution", put(update_distribution))
        .route("/v1/reservations/:id/ledger/repair", post(repair_ledger))
        .route("/v1/ledger/audit", get(audit_ledger))
        .route("/v1/catalog", get(list_catalog))
        .route("/v1/reports/monthly", get(monthly_report))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Engine error carried to the HTTP surface.
pub struct ApiError(pub ReservationError);

impl From<ReservationError> for ApiError {
    fn from(e: ReservationError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(e: &ReservationError) -> StatusCode {
    match e {
        ReservationError::Validation(_)
        | ReservationError::InvalidAmount(_)
        | ReservationError::NothingPending { .. }
        | ReservationError::AmountExceedsPending { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ReservationError::SlotConflict { .. } => StatusCode::CONFLICT,
        ReservationError::NotFound { .. } => StatusCode::NOT_FOUND,
        ReservationError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!(error = %self.0, "request failed: store unavailable");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.kind().to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

fn invalid(msg: impl Into<String>) -> ApiError {
    ApiError(ReservationError::Validation(msg.into()))
}

fn parse_date(field: &str, raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| invalid(format!("{field} must be YYYY-MM-DD, got {raw:?}")))
}

fn parse_window(start: &str, end: &str) -> ApiResult<TimeWindow> {
    TimeWindow::from_clock(start, end).map_err(|e| ApiError(e.into()))
}

fn parse_status(raw: &str) -> ApiResult<ReservationStatus> {
    ReservationStatus::parse(raw).ok_or_else(|| {
        invalid(format!(
            "status must be Confirmed, Completed or Cancelled, got {raw:?}"
        ))
    })
}

fn draft_from_request(req: ReservationRequest) -> ApiResult<ReservationDraft> {
    let date = parse_date("resourceDate", &req.resource_date)?;

    let mut items = Vec::with_capacity(req.items.len());
    for item in req.items {
        let quantity = amount_from_input("quantity", item.quantity)?;
        let unit_price = amount_from_input("unitPrice", item.unit_price)?;
        items.push(LineItemDraft::new(item.name, quantity, unit_price));
    }

    let mut draft = match req.kind {
        ReservationKind::Booking => {
            let (Some(start), Some(end)) = (req.start_time.as_deref(), req.end_time.as_deref())
            else {
                return Err(invalid("a booking requires startTime and endTime"));
            };
            let mut draft = ReservationDraft::booking(date, parse_window(start, end)?);
            // Rejected by the engine; carried so the error names the rule.
            draft.items = items;
            draft
        }
        ReservationKind::Distribution => ReservationDraft::distribution(date, items),
    };

    if let Some(total) = req.total_amount {
        draft = draft.with_total(amount_from_input("totalAmount", total)?);
    }
    draft = draft.with_received(amount_from_input("receivedAmount", req.received_amount)?);
    if let Some(status) = req.status.as_deref() {
        draft = draft.with_status(parse_status(status)?);
    }
    Ok(draft.with_party(req.party))
}

fn filter_from_query(q: ListQuery) -> ApiResult<ReservationFilter> {
    let kind = match q.kind.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(k) if k.eq_ignore_ascii_case("booking") => Some(ReservationKind::Booking),
        Some(k) if k.eq_ignore_ascii_case("distribution") => Some(ReservationKind::Distribution),
        Some(other) => {
            return Err(invalid(format!(
                "kind must be booking or distribution, got {other:?}"
            )))
        }
    };
    let date = match q.date.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(parse_date("date", raw)?),
    };
    Ok(ReservationFilter {
        kind,
        date,
        person_name: q.person_name,
        event_purpose: q.event_purpose,
    })
}

// ---------------------------------------------------------------------------
// GET /v1/health  /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            backend: st.service.store().backend(),
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(st.status()))
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

/// Display-ordered, filtered list.
pub(crate) async fn list_reservations(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<ReservationListResponse>> {
    let filter = filter_from_query(q)?;
    let snapshot = st.live_view.snapshot().await?;
    let reservations: Vec<ReservationView> = filter
        .apply(&snapshot)
        .into_iter()
        .cloned()
        .map(ReservationView::from)
        .collect();
    Ok(Json(ReservationListResponse {
        count: reservations.len(),
        reservations,
    }))
}

pub(crate) async fn create_reservation(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ReservationRequest>,
) -> ApiResult<(StatusCode, Json<ReservationView>)> {
    let draft = draft_from_request(req)?;
    let created = st.service.create_reservation(&draft).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub(crate) async fn propose_reservation(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ProposeRequest>,
) -> ApiResult<Json<ProposeResponse>> {
    let date = parse_date("resourceDate", &req.resource_date)?;
    let window = parse_window(&req.start_time, &req.end_time)?;
    st.service
        .propose_reservation(date, window, req.exclude_id.as_deref())
        .await?;
    Ok(Json(ProposeResponse { admitted: true }))
}

pub(crate) async fn get_reservation(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationView>> {
    Ok(Json(st.service.get_reservation(&id).await?.into()))
}

pub(crate) async fn delete_reservation(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    st.service.delete_reservation(&id).await?;
    info!(%id, "reservation deleted via api");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn receive_payment(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    let amount = amount_from_input("amount", req.amount)?;
    let receipt = st.service.receive_pending_payment(&id, amount).await?;
    Ok(Json(receipt))
}

pub(crate) async fn update_status(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StatusChangeRequest>,
) -> ApiResult<Json<ReservationView>> {
    let status = parse_status(&req.status)?;
    Ok(Json(st.service.update_status(&id, status).await?.into()))
}

pub(crate) async fn revise_booking(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ReviseRequest>,
) -> ApiResult<Json<ReservationView>> {
    let date = parse_date("resourceDate", &req.resource_date)?;
    let window = parse_window(&req.start_time, &req.end_time)?;
    Ok(Json(st.service.revise_booking(&id, date, window).await?.into()))
}

pub(crate) async fn update_distribution(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut req): Json<ReservationRequest>,
) -> ApiResult<Json<ReservationView>> {
    req.kind = ReservationKind::Distribution;
    let draft = draft_from_request(req)?;
    Ok(Json(st.service.update_distribution(&id, &draft).await?.into()))
}

pub(crate) async fn repair_ledger(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(st.service.repair_ledger(&id).await?))
}

// ---------------------------------------------------------------------------
// Ledger audit, catalog, reports
// ---------------------------------------------------------------------------

pub(crate) async fn audit_ledger(State(st): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(st.service.audit().await?))
}

pub(crate) async fn list_catalog(
    State(st): State<Arc<AppState>>,
) -> ApiResult<Json<CatalogListResponse>> {
    let entries: Vec<CatalogEntryView> = st
        .service
        .catalog()
        .list()
        .await
        .map_err(ReservationError::from)?
        .into_iter()
        .map(|entry| CatalogEntryView {
            slug: entry.slug.clone(),
            entry,
        })
        .collect();
    Ok(Json(CatalogListResponse {
        count: entries.len(),
        entries,
    }))
}

pub(crate) async fn monthly_report(
    State(st): State<Arc<AppState>>,
    Query(q): Query<MonthQuery>,
) -> ApiResult<impl IntoResponse> {
    if !(1..=12).contains(&q.month) {
        return Err(invalid(format!("month must be 1..=12, got {}", q.month)));
    }
    let reservations = st.service.list_reservations().await?;
    Ok(Json(summarize_month(&reservations, q.year, q.month)))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

/// Replays the cached snapshot (if any), then forwards bus events.
pub(crate) async fn stream_handler(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    // Subscribe first so nothing published after the replay is missed.
    let rx = st.bus.subscribe();
    let replay = st.live_view.cached().map(|s| BusMsg::snapshot(&s));
    let events = stream::iter(replay.into_iter().filter_map(to_event).map(Ok))
        .chain(broadcast_to_sse(rx));

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn to_event(msg: BusMsg) -> Option<Event> {
    let data = serde_json::to_string(&msg).ok()?;
    Some(Event::default().event(msg.event_name()).data(data))
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => to_event(m).map(Ok),
            // Lagged: the next snapshot supersedes whatever was missed.
            Err(_) => None,
        }
    })
}
