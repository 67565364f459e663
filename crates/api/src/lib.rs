use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::middleware::map_response;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use visitgate_core::{DecisionEngine, RuleTable};
use visitgate_enrichment::{Enricher, EnrichmentClient, EnrichmentConfig};
use visitgate_intake::{parse_body, IntakeError, IntakeOrchestrator};
use visitgate_observability::{AppMetrics, IntakeOutcome};

const MAX_BODY_BYTES: usize = 64 * 1024;
const ENRICHMENT_REQUIRED_DETAILS: &str =
    "The enrichment model is required for this workflow. Ensure the completion endpoint is running.";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub enrichment: EnrichmentConfig,
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            enrichment: EnrichmentConfig::from_env(),
            allowed_origins: parse_allowed_origins(),
        }
    }

    pub fn new(enrichment: EnrichmentConfig) -> Self {
        Self {
            enrichment,
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub intake: Arc<IntakeOrchestrator<EnrichmentClient>>,
    pub metrics: Arc<AppMetrics>,
    pub allowed_origins: Arc<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    enrichment_model: String,
    metrics: visitgate_observability::MetricsSnapshot,
}

pub fn build_app(config: AppConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();
    let enricher =
        EnrichmentClient::new(config.enrichment).context("failed to build enrichment client")?;
    let intake = Arc::new(IntakeOrchestrator::new(
        DecisionEngine::new(RuleTable::standard()),
        enricher,
        metrics.clone(),
    ));

    let state = ApiState {
        intake,
        metrics,
        allowed_origins: Arc::new(config.allowed_origins),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/intake", post(intake))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(map_response(json_payload_too_large))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        enrichment_model: state.intake.enricher().model().to_string(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn intake(State(state): State<ApiState>, body: Bytes) -> Response {
    let raw = match parse_body(&body) {
        Ok(value) => value,
        Err(error) => {
            state.metrics.record(IntakeOutcome::Malformed);
            return intake_error_response(&IntakeError::from(error));
        }
    };

    match state.intake.clone().handle_isolated(raw).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => intake_error_response(&error),
    }
}

fn intake_error_response(error: &IntakeError) -> Response {
    match error {
        IntakeError::MalformedRequest(reason) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": reason.message()
            })),
        )
            .into_response(),
        IntakeError::EnrichmentUnavailable(cause) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "error": "enrichment service unavailable",
                "message": cause.to_string(),
                "details": ENRICHMENT_REQUIRED_DETAILS
            })),
        )
            .into_response(),
        IntakeError::Unclassified(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "internal server error"
            })),
        )
            .into_response(),
    }
}

/// The body limit layer answers in plain text; rejections here are always `{ error }`.
async fn json_payload_too_large(response: Response) -> Response {
    if response.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return response;
    }
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(serde_json::json!({
            "error": format!("request body exceeds {} bytes", MAX_BODY_BYTES)
        })),
    )
        .into_response()
}

fn default_allowed_origins() -> Vec<String> {
    [
        "http://localhost:5173",
        "http://127.0.0.1:5173",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ]
    .iter()
    .map(|origin| origin.to_string())
    .collect()
}

fn parse_allowed_origins() -> Vec<String> {
    env::var("VISITGATE_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(default_allowed_origins)
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5173")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
