use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;
use visitgate_api::{build_app, AppConfig};
use visitgate_core::{sample_visits, IntakeSource};
use visitgate_enrichment::EnrichmentConfig;

const STUB_MODEL: &str = "stub-model";

#[derive(Clone)]
enum StubReply {
    Rewrite(&'static str),
    Failure(StatusCode, &'static str),
    EmptyContent,
}

#[derive(Clone)]
struct StubState {
    reply: StubReply,
    calls: Arc<AtomicUsize>,
}

async fn completions(State(stub): State<StubState>, Json(body): Json<Value>) -> Response {
    stub.calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["model"], STUB_MODEL);
    assert_eq!(body["max_tokens"], 100);

    match stub.reply {
        StubReply::Rewrite(text) => {
            Json(json!({ "choices": [{ "message": { "role": "assistant", "content": text } }] }))
                .into_response()
        }
        StubReply::Failure(status, body) => (status, body).into_response(),
        StubReply::EmptyContent => {
            Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "" } }] }))
                .into_response()
        }
    }
}

/// Serves a fake completion endpoint on an ephemeral port.
async fn spawn_stub(reply: StubReply) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(StubState {
            reply,
            calls: calls.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), calls)
}

fn app_for(base_url: &str) -> Router {
    build_app(AppConfig::new(EnrichmentConfig::new(base_url, STUB_MODEL))).expect("app should build")
}

fn intake_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/intake")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn envelope(purpose: &str, time: &str, badge_required: bool, pre_registered: bool) -> Value {
    json!({
        "source": "qr_scan",
        "payload": {
            "visitor_id": "V-10293",
            "purpose": purpose,
            "time": time,
            "host": "eng",
            "badge_required": badge_required,
            "pre_registered": pre_registered
        }
    })
}

async fn read_json(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_ok_and_model() {
    let (base_url, _) = spawn_stub(StubReply::Rewrite("unused")).await;
    let app = app_for(&base_url);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["enrichment_model"], STUB_MODEL);
}

#[tokio::test]
async fn intake_returns_enriched_decision() {
    let (base_url, calls) = spawn_stub(StubReply::Rewrite("  Welcome! Please check in at the front desk.  ")).await;
    let app = app_for(&base_url);

    let response = app
        .oneshot(intake_request(envelope("interview", "10:30", true, true).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(
        body,
        json!({
            "decision": "approve",
            "route": "front_desk",
            "explanation": "Welcome! Please check in at the front desk.",
            "policy_id": "interview_business_hours_v1",
            "model_used": STUB_MODEL
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn contractor_after_hours_routes_to_security() {
    let (base_url, _) = spawn_stub(StubReply::Rewrite("Security will review your visit.")).await;
    let app = app_for(&base_url);

    let response = app
        .oneshot(intake_request(envelope("contractor", "20:30", false, false).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["policy_id"], "contractor_after_hours_v1");
    assert_eq!(body["decision"], "review");
    assert_eq!(body["route"], "security");
}

#[tokio::test]
async fn every_sample_visit_hits_its_rule_over_http() {
    let (base_url, calls) = spawn_stub(StubReply::Rewrite("Rewritten.")).await;
    let app = app_for(&base_url);
    let samples = sample_visits();

    for sample in &samples {
        let response = app
            .clone()
            .oneshot(intake_request(sample.envelope(IntakeSource::Gallery).to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", sample.name);
        let body = read_json(response).await;
        assert_eq!(body["policy_id"], sample.expected_policy_id, "{}", sample.name);
    }
    assert_eq!(calls.load(Ordering::SeqCst), samples.len());
}

#[tokio::test]
async fn missing_source_is_bad_request_without_enrichment() {
    let (base_url, calls) = spawn_stub(StubReply::Rewrite("unused")).await;
    let app = app_for(&base_url);

    let mut body = envelope("delivery", "11:00", false, false);
    body.as_object_mut().unwrap().remove("source");
    let response = app.oneshot(intake_request(body.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"], "missing required fields: source, payload");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn truthy_string_flags_are_bad_request() {
    let (base_url, _) = spawn_stub(StubReply::Rewrite("unused")).await;
    let app = app_for(&base_url);

    let mut body = envelope("delivery", "11:00", false, false);
    body["payload"]["badge_required"] = json!("false");
    let response = app.oneshot(intake_request(body.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid payload structure"));
}

#[tokio::test]
async fn invalid_time_is_bad_request() {
    let (base_url, _) = spawn_stub(StubReply::Rewrite("unused")).await;
    let app = app_for(&base_url);

    let response = app
        .oneshot(intake_request(envelope("interview", "24:10", true, true).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_json_body_is_bad_request() {
    let (base_url, _) = spawn_stub(StubReply::Rewrite("unused")).await;
    let app = app_for(&base_url);

    let response = app.oneshot(intake_request("not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn enrichment_500_is_service_unavailable_not_raw_explanation() {
    let (base_url, calls) =
        spawn_stub(StubReply::Failure(StatusCode::INTERNAL_SERVER_ERROR, "model not loaded")).await;
    let app = app_for(&base_url);

    let response = app
        .oneshot(intake_request(envelope("delivery", "11:00", false, false).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["error"], "enrichment service unavailable");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("500"));
    assert!(message.contains("model not loaded"));
    assert!(body["details"].is_string());
    assert!(body.get("decision").is_none());
    assert!(body.get("explanation").is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_completion_is_service_unavailable() {
    let (base_url, _) = spawn_stub(StubReply::EmptyContent).await;
    let app = app_for(&base_url);

    let response = app
        .oneshot(intake_request(envelope("delivery", "11:00", false, false).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("empty completion"));
}

#[tokio::test]
async fn unreachable_enrichment_is_service_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let app = app_for(&format!("http://{}", addr));

    let response = app
        .oneshot(intake_request(envelope("other", "12:00", false, false).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_metrics_track_outcomes() {
    let (base_url, _) = spawn_stub(StubReply::Failure(StatusCode::BAD_GATEWAY, "")).await;
    let app = app_for(&base_url);

    let failed = app
        .clone()
        .oneshot(intake_request(envelope("other", "12:00", false, false).to_string()))
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::SERVICE_UNAVAILABLE);

    let rejected = app
        .clone()
        .oneshot(intake_request(json!({ "payload": {} }).to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = read_json(health).await;
    assert_eq!(body["metrics"]["intake_requests_total"], 2);
    assert_eq!(body["metrics"]["enrichment_failures_total"], 1);
    assert_eq!(body["metrics"]["malformed_requests_total"], 1);
    assert_eq!(body["metrics"]["intakes_completed_total"], 0);
}

#[tokio::test]
async fn oversized_body_is_rejected_as_json() {
    let (base_url, calls) = spawn_stub(StubReply::Rewrite("unused")).await;
    let app = app_for(&base_url);

    let oversized = "x".repeat(70 * 1024);
    let request = Request::builder()
        .method("POST")
        .uri("/intake")
        .header("content-type", "application/json")
        .header("content-length", oversized.len())
        .body(Body::from(oversized))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = read_json(response).await;
    assert_eq!(body["error"], "request body exceeds 65536 bytes");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
