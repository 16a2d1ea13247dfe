//! REST handlers for billboard provisioning, the booking lifecycle, alerts,
//! and operational probes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use billboard_booking::{BookingLifecycleManager, BookingRequest};
use billboard_core::error::{ConflictWindow, FleetError};
use billboard_core::store::BillboardRepository;
use billboard_core::types::{Alert, Billboard, Booking, CreativeAsset};
use billboard_fleet::FleetConnectionRegistry;
use billboard_monitoring::AlertManager;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

/// Maximum billboard id length at the API boundary.
const MAX_ID_LEN: usize = 64;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub billboards: Arc<dyn BillboardRepository>,
    pub lifecycle: Arc<BookingLifecycleManager>,
    pub fleet: Arc<FleetConnectionRegistry>,
    pub alerts: Arc<AlertManager>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ConflictWindow>>,
}

/// Domain error mapped onto an HTTP status. Conflict windows ride along on
/// booking conflicts so the caller can offer alternative slots.
pub struct ApiError(pub FleetError);

impl From<FleetError> for ApiError {
    fn from(e: FleetError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match &self.0 {
            FleetError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            FleetError::BookingConflict { .. } => (StatusCode::CONFLICT, "booking_conflict"),
            FleetError::PaymentVerification(_) => {
                (StatusCode::PAYMENT_REQUIRED, "payment_verification_failed")
            }
            FleetError::InvalidTransition { .. }
            | FleetError::InvalidCampaignTransition { .. }
            | FleetError::AlertState(_) => (StatusCode::CONFLICT, "invalid_state"),
            FleetError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            FleetError::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            FleetError::Serialization(_) | FleetError::Io(_) | FleetError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
            "Internal processing error".to_string()
        } else {
            self.0.to_string()
        };
        let conflicts = match self.0 {
            FleetError::BookingConflict { conflicts } => Some(conflicts),
            _ => None,
        };
        if status != StatusCode::INTERNAL_SERVER_ERROR {
            metrics::counter!("api.request_errors", "error" => error).increment(1);
        }
        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
                conflicts,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Billboards
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ProvisionRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// POST /v1/billboards. Mints the per-device api key; this response is the
/// only place the key is returned in full.
pub async fn provision_billboard(
    State(state): State<AppState>,
    Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<Billboard>), ApiError> {
    if request.id.is_empty() || request.id.len() > MAX_ID_LEN {
        return Err(FleetError::Validation(format!(
            "billboard id must be 1..={} characters",
            MAX_ID_LEN
        ))
        .into());
    }
    if !request
        .id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(
            FleetError::Validation("billboard id must be alphanumeric with - or _".to_string())
                .into(),
        );
    }

    let api_key: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let billboard = state.billboards.insert(Billboard::new(
        request.id,
        request.name,
        request.location,
        api_key,
    ))?;
    metrics::counter!("api.billboards_provisioned").increment(1);
    Ok((StatusCode::CREATED, Json(billboard)))
}

/// GET /v1/billboards/:id.
pub async fn get_billboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Billboard>, ApiError> {
    state
        .billboards
        .get(&id)
        .map(Json)
        .ok_or_else(|| FleetError::NotFound(format!("billboard {}", id)).into())
}

/// GET /v1/billboards — the currently online fleet.
pub async fn list_online_billboards(State(state): State<AppState>) -> Json<Vec<Billboard>> {
    Json(state.billboards.list_online())
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub billboard_id: String,
    pub advertiser_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub amount: f64,
    pub assets: Vec<CreativeAsset>,
}

#[derive(Serialize)]
pub struct CreateBookingResponse {
    pub booking: Booking,
    pub payment_reference: String,
    pub redirect_url: String,
}

/// POST /v1/bookings.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), ApiError> {
    let (booking, session) = state
        .lifecycle
        .create_booking(BookingRequest {
            billboard_id: request.billboard_id,
            advertiser_id: request.advertiser_id,
            start_time: request.start_time,
            end_time: request.end_time,
            amount: request.amount,
            assets: request.assets,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking,
            payment_reference: session.reference,
            redirect_url: session.redirect_url,
        }),
    ))
}

/// GET /v1/bookings/:id.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    state
        .lifecycle
        .get_booking(id)
        .map(Json)
        .ok_or_else(|| FleetError::NotFound(format!("booking {}", id)).into())
}

#[derive(Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_ref: String,
}

/// POST /v1/bookings/:id/confirm.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .lifecycle
        .confirm_payment(id, &request.payment_ref)
        .await?;
    Ok(Json(booking))
}

/// POST /v1/bookings/:id/activate — manual activation ahead of the
/// scheduler sweep.
pub async fn activate_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.lifecycle.activate(id).await?))
}

/// POST /v1/bookings/:id/complete.
pub async fn complete_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.lifecycle.complete(id).await?))
}

#[derive(Deserialize)]
pub struct CancelBookingRequest {
    pub reason: String,
    #[serde(default)]
    pub refund_amount: Option<f64>,
}

/// POST /v1/bookings/:id/cancel.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .lifecycle
        .cancel(id, &request.reason, request.refund_amount)
        .await?;
    Ok(Json(booking))
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub unresolved_only: bool,
}

/// GET /v1/alerts.
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Json<Vec<Alert>> {
    if query.unresolved_only {
        Json(state.alerts.list_unresolved())
    } else {
        Json(state.alerts.list())
    }
}

#[derive(Deserialize)]
pub struct AlertActionRequest {
    pub by: String,
}

/// POST /v1/alerts/:id/acknowledge.
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AlertActionRequest>,
) -> Result<Json<Alert>, ApiError> {
    if request.by.trim().is_empty() {
        warn!(alert_id = %id, "Acknowledge without an actor");
        return Err(FleetError::Validation("'by' must not be empty".to_string()).into());
    }
    Ok(Json(state.alerts.acknowledge(id, &request.by)?))
}

/// POST /v1/alerts/:id/resolve.
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AlertActionRequest>,
) -> Result<Json<Alert>, ApiError> {
    if request.by.trim().is_empty() {
        return Err(FleetError::Validation("'by' must not be empty".to_string()).into());
    }
    Ok(Json(state.alerts.resolve(id, &request.by)?))
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub connected_devices: usize,
    pub unresolved_alerts: usize,
}

/// GET /health.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connected_devices: state.fleet.connection_count(),
        unresolved_alerts: state.alerts.unresolved_count(),
    })
}

/// GET /ready — readiness probe for Kubernetes.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
