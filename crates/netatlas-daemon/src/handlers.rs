//! HTTP query and mutating surface.
//!
//! Thin axum handlers over [`crate::state::ServiceHandle`]; each maps one operation of
//! the service to a route and translates the typed error taxonomy to an
//! HTTP status:
//!
//! | Error class | Status |
//! |-------------|--------|
//! | rate-limit (cooldown / in-flight) | 429 |
//! | resource exhaustion (budget, certification) | 503 |
//! | transport / upstream status | 502 |
//! | decode / malformed document | 422 |
//! | subnet not found | 404 |
//! | persistence | 500 |

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use netatlas_core::fetch::FetchError;
use netatlas_core::refresh::{Freshness, RefreshError};
use netatlas_core::stats::NetworkStats;
use netatlas_core::store::{CertifiedSnapshot, StoreError};
use netatlas_core::topology::{RawNodeRecord, SubnetRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::service::{HealthSummary, MutationSummary, ServiceError};
use crate::state::SharedState;

/// Builds the service router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/subnets", get(list_subnets))
        .route("/subnets/{id}", get(get_subnet))
        .route("/stats", get(stats_real))
        .route("/stats/all", get(stats_all))
        .route("/health", get(health))
        .route("/freshness", get(freshness))
        .route("/certified", get(certified))
        .route("/refresh", post(trigger_refresh))
        .route("/upload", post(upload))
        .route("/clear", post(clear))
        .route("/recertify", post(recertify))
        .with_state(state)
}

/// A service error carried to the HTTP layer.
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ns: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, retry_after_ns) = match &self.0 {
            ServiceError::Refresh(RefreshError::CooldownActive { remaining_ns }) => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited", Some(*remaining_ns))
            },
            ServiceError::Refresh(RefreshError::AlreadyInFlight) => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited", None)
            },
            ServiceError::Fetch(FetchError::InsufficientBudget { .. })
            | ServiceError::Store(StoreError::CertificationExhausted { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "resource_exhausted", None)
            },
            ServiceError::Fetch(FetchError::Transport { .. } | FetchError::BadStatus { .. }) => {
                (StatusCode::BAD_GATEWAY, "transport", None)
            },
            ServiceError::Fetch(
                FetchError::BodyDecode { .. } | FetchError::MalformedDocument { .. },
            ) => (StatusCode::UNPROCESSABLE_ENTITY, "decode", None),
            ServiceError::Store(StoreError::SubnetNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "not_found", None)
            },
            ServiceError::Persist(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence", None)
            },
            // The core error enums are non-exhaustive; anything a future
            // variant adds is an internal failure until mapped here.
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal", None),
        };
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
            retry_after_ns,
        };
        (status, Json(body)).into_response()
    }
}

/// Certified bundle as served to callers.
#[derive(Debug, Serialize)]
struct CertifiedBundle {
    stats: NetworkStats,
    fingerprint: String,
    certificate: Option<String>,
}

impl From<CertifiedSnapshot> for CertifiedBundle {
    fn from(snapshot: CertifiedSnapshot) -> Self {
        Self {
            stats: snapshot.stats,
            fingerprint: hex::encode(snapshot.fingerprint),
            certificate: snapshot.certificate.map(hex::encode),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    caller: Option<String>,
}

#[derive(Debug, Serialize)]
struct MutationResponse {
    message: &'static str,
    total_subnets: u64,
    total_nodes: u64,
}

impl MutationResponse {
    const fn new(message: &'static str, summary: MutationSummary) -> Self {
        Self {
            message,
            total_subnets: summary.total_subnets,
            total_nodes: summary.total_nodes,
        }
    }
}

async fn list_subnets(State(state): State<SharedState>) -> Json<Vec<SubnetRecord>> {
    Json(state.subnets().await)
}

async fn get_subnet(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SubnetRecord>, ApiError> {
    Ok(Json(state.subnet(&id).await?))
}

async fn stats_real(State(state): State<SharedState>) -> Json<NetworkStats> {
    Json(state.stats_real().await)
}

async fn stats_all(State(state): State<SharedState>) -> Json<NetworkStats> {
    Json(state.stats_all().await)
}

async fn health(State(state): State<SharedState>) -> Json<HealthSummary> {
    Json(state.health().await)
}

async fn freshness(State(state): State<SharedState>) -> Json<Freshness> {
    Json(state.freshness().await)
}

async fn certified(State(state): State<SharedState>) -> Json<CertifiedBundle> {
    Json(state.certified().await.into())
}

async fn trigger_refresh(
    State(state): State<SharedState>,
    body: Option<Json<RefreshRequest>>,
) -> Result<Json<MutationResponse>, ApiError> {
    let caller = body.and_then(|Json(request)| request.caller);
    let summary = state.refresh(caller).await?;
    Ok(Json(MutationResponse::new("refresh complete", summary)))
}

async fn upload(
    State(state): State<SharedState>,
    Json(records): Json<Vec<RawNodeRecord>>,
) -> Result<Json<MutationResponse>, ApiError> {
    let count = records.len();
    let summary = state.upload(records).await?;
    info!(records = count, "upload ingested");
    Ok(Json(MutationResponse::new("upload ingested", summary)))
}

async fn clear(State(state): State<SharedState>) -> Result<Json<MutationResponse>, ApiError> {
    let summary = state.clear().await?;
    Ok(Json(MutationResponse::new("store cleared", summary)))
}

async fn recertify(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    state.recertify().await?;
    Ok(StatusCode::NO_CONTENT)
}
