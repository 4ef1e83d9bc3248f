//! GitHub webhook receiver.
//!
//! The endpoint is unauthenticated. The request body is either raw JSON or a
//! form-encoded body carrying the JSON in its `payload` parameter.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use hookbridge_core::errors::{MalformedUrlError, PayloadParseError};
use hookbridge_core::processor::ProcessReport;
use hookbridge_core::webhook::extract_payload;

use crate::api::status::AppError;
use crate::AppState;

#[derive(Serialize)]
struct WebhookResponse {
    ok: bool,
    message: String,
    events: usize,
    matched: usize,
    scheduled: usize,
    failed: usize,
    unresolved: Vec<MalformedUrlError>,
}

impl WebhookResponse {
    fn from_report(report: ProcessReport) -> Self {
        let matched = report.matched_count();
        let scheduled = report.scheduled_count();
        let failed = report.failed_count();
        Self {
            ok: true,
            message: format!(
                "{} event(s), {} job(s) matched, {} build(s) scheduled",
                report.events.len(),
                matched,
                scheduled
            ),
            events: report.events.len(),
            matched,
            scheduled,
            failed,
            unresolved: report.unresolved,
        }
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/github-webhook", post(github_webhook))
        .route("/github-webhook/", post(github_webhook))
}

async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    if event_type == "ping" {
        info!("received GitHub ping");
        record_unprocessed(&state, event_type, "ignored", "pong");
        return Ok("pong".into_response());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    // Builds reach the runner only once their dispatch rows exist.
    let report = extract_payload(content_type, &body)
        .and_then(|payload| {
            state.processor.process_with(payload.as_bytes(), |report| {
                if let Err(e) = state.db.record_report(event_type, report) {
                    warn!(error = %e, "failed to record delivery");
                }
            })
        })
        .map_err(|e| reject(&state, event_type, e))?;

    Ok(Json(WebhookResponse::from_report(report)).into_response())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reject(state: &AppState, event_type: &str, error: PayloadParseError) -> AppError {
    warn!(event_type, error = %error, "rejecting webhook payload");
    let message = error.to_string();
    record_unprocessed(state, event_type, "rejected", &message);
    AppError::BadRequest(message)
}

fn record_unprocessed(state: &AppState, event_type: &str, status: &str, detail: &str) {
    if let Err(e) = state.db.record_unprocessed_delivery(event_type, status, detail) {
        warn!(error = %e, "failed to record delivery");
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support::{body_json, job, test_app};

    fn push_json(url: &str) -> String {
        serde_json::json!({
            "ref": "refs/heads/master",
            "repository": {
                "url": url,
                "name": "foo",
                "owner": { "name": "kohsuke" }
            }
        })
        .to_string()
    }

    fn post(uri: &str, content_type: &str, body: String) -> Request<Body> {
        Request::post(uri)
            .header("content-type", content_type)
            .header("x-github-event", "push")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_push_schedules_matching_job() {
        let mut app = test_app(vec![
            job("foo-ci", "https://github.com/kohsuke/foo"),
            job("bar-ci", "https://github.com/kohsuke/bar"),
        ]);

        let response = app
            .router
            .clone()
            .oneshot(post(
                "/github-webhook",
                "application/json",
                push_json("https://github.com/kohsuke/foo"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["events"], 1);
        assert_eq!(body["matched"], 1);
        assert_eq!(body["scheduled"], 1);
        assert_eq!(body["failed"], 0);

        let request = app.builds.recv().await.unwrap();
        assert_eq!(request.job, "foo-ci");

        let deliveries = app.state.db.list_deliveries(10).unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, "processed");
        let dispatches = app.state.db.list_dispatches(&deliveries[0].id).unwrap();
        assert_eq!(dispatches[0].request_id, Some(request.id.to_string()));
    }

    #[tokio::test]
    async fn test_form_encoded_body_with_trailing_slash() {
        let app = test_app(vec![job("foo-ci", "https://github.com/kohsuke/foo")]);
        let json = push_json("https://github.com/kohsuke/foo.git");
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", &json)
            .finish();

        let response = app
            .router
            .oneshot(post(
                "/github-webhook/",
                "application/x-www-form-urlencoded",
                form,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["matched"], 1);
    }

    #[tokio::test]
    async fn test_no_match_is_still_ok() {
        let app = test_app(vec![job("bar-ci", "https://github.com/kohsuke/bar")]);
        let response = app
            .router
            .oneshot(post(
                "/github-webhook",
                "application/json",
                push_json("https://github.com/kohsuke/foo"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["matched"], 0);
        assert_eq!(body["scheduled"], 0);
    }

    #[tokio::test]
    async fn test_malformed_url_is_reported_not_rejected() {
        let app = test_app(Vec::new());
        let response = app
            .router
            .oneshot(post(
                "/github-webhook",
                "application/json",
                push_json("git://github.com/kohsuke/foo.git"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["events"], 0);
        assert_eq!(body["unresolved"][0]["url"], "git://github.com/kohsuke/foo.git");
    }

    #[tokio::test]
    async fn test_invalid_payload_is_bad_request() {
        let app = test_app(Vec::new());
        let response = app
            .router
            .clone()
            .oneshot(post("/github-webhook", "application/json", "{not json".into()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("not valid JSON"));

        let deliveries = app.state.db.list_deliveries(10).unwrap();
        assert_eq!(deliveries[0].status, "rejected");
    }

    #[tokio::test]
    async fn test_form_without_payload_is_bad_request() {
        let app = test_app(Vec::new());
        let response = app
            .router
            .oneshot(post(
                "/github-webhook",
                "application/x-www-form-urlencoded",
                "other=1".into(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ping_answers_pong() {
        let app = test_app(Vec::new());
        let response = app
            .router
            .oneshot(
                Request::post("/github-webhook")
                    .header("x-github-event", "ping")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"pong");
    }
}
