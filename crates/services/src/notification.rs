use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use paytrace_core::model::payment::{NotificationRecord, StatusCheckRequest, StatusCheckResponse};
use paytrace_trace::{Span, propagation};
use tracing::{info, warn};

use crate::client::endpoint;
use crate::error::{HopError, decode_json};
use crate::fraud;
use crate::state::HopState;

pub const ROUTE: &str = "/api/notification";

pub fn router(state: HopState) -> Router {
    Router::new()
        .route(ROUTE, post(send_notification))
        .with_state(state)
}

async fn send_notification(
    State(state): State<HopState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parent = propagation::extract(&headers);
    let mut span = state
        .tracer
        .start_entry("HTTP POST /api/notification", parent.as_ref());
    let outcome = notify(&state, &span, &body).await;
    // request-level success label, independent of the span status
    span.set_attribute("error", outcome.is_err());
    match outcome {
        Ok(()) => {
            info!(trace_id = %span.context().trace_id(), "notification sent");
            StatusCode::OK.into_response()
        }
        Err(err) => {
            warn!(trace_id = %span.context().trace_id(), error = %err, "notification failed");
            span.record_error(&err);
            err.into_response()
        }
    }
}

async fn notify(state: &HopState, span: &Span, body: &[u8]) -> Result<(), HopError> {
    let record: NotificationRecord = decode_json(body)?;
    save_notification(state, span).await?;
    if state.settings.confirm_status {
        check_fraud(state, span, &record.card_id).await?;
    }
    Ok(())
}

async fn save_notification(state: &HopState, parent: &Span) -> Result<(), HopError> {
    let mut span = parent.child("save-notification");
    state
        .injector
        .save(
            &mut span,
            state.settings.save_profile,
            "timeout saving notification",
        )
        .await
}

async fn check_fraud(state: &HopState, parent: &Span, card_id: &str) -> Result<(), HopError> {
    let mut span = parent.client_child("check-fraud");
    let url = endpoint(&state.settings.fraud_url, fraud::ROUTE);
    let request = StatusCheckRequest {
        card_id: card_id.to_string(),
    };
    let result = state
        .client
        .get_json::<_, StatusCheckResponse>("fraud", &url, &request, span.context())
        .await
        .and_then(|status| {
            if status.is_active() {
                Ok(())
            } else {
                Err(HopError::Downstream {
                    target: "fraud".to_string(),
                    reason: format!("card status {:?}", status.status),
                })
            }
        });
    if let Err(err) = &result {
        span.record_error(err);
    }
    result
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use paytrace_core::model::span::{AttrValue, SpanRecord};
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing::{fast_settings, state};

    /// Fraud stand-in whose status check always answers `body`.
    async fn fraud_stub(body: &'static str) -> String {
        let app = Router::new().route(
            fraud::ROUTE,
            axum::routing::get(move || async move { body }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    async fn confirm_against(body: &'static str) -> (StatusCode, Vec<SpanRecord>) {
        let mut settings = fast_settings();
        settings.fraud_url = fraud_stub(body).await;
        let (state, sink, exporter) = state("notification", [0], settings);
        let response = router(state)
            .oneshot(request(r#"{"card_id":"123"}"#))
            .await
            .unwrap();
        sink.flush().await;
        (response.status(), exporter.spans())
    }

    fn request(body: &'static str) -> Request<Body> {
        Request::post(ROUTE).body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn saves_without_confirmation() {
        let mut settings = fast_settings();
        settings.confirm_status = false;
        let (state, sink, exporter) = state("notification", [2], settings);
        let response = router(state)
            .oneshot(request(r#"{"card_id":"123"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        sink.flush().await;
        let spans = exporter.spans();
        assert_eq!(spans.len(), 2);
        let entry = spans
            .iter()
            .find(|s| s.name == "HTTP POST /api/notification")
            .unwrap();
        assert_eq!(entry.attribute("error"), Some(&AttrValue::Bool(false)));
        assert!(!entry.is_error());
    }

    #[tokio::test]
    async fn failed_save_is_labelled() {
        let (state, sink, exporter) = state("notification", [3], fast_settings());
        let response = router(state)
            .oneshot(request(r#"{"card_id":"123"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        sink.flush().await;
        let spans = exporter.spans();
        assert!(spans.iter().all(|s| s.name != "check-fraud"));
        let entry = spans
            .iter()
            .find(|s| s.name == "HTTP POST /api/notification")
            .unwrap();
        assert_eq!(entry.attribute("error"), Some(&AttrValue::Bool(true)));
        assert_eq!(entry.error.as_deref(), Some("timeout saving notification"));
    }

    #[tokio::test]
    async fn malformed_body_is_labelled() {
        let (state, sink, exporter) = state("notification", [], fast_settings());
        let response = router(state).oneshot(request("{")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        sink.flush().await;
        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attribute("error"), Some(&AttrValue::Bool(true)));
    }

    #[tokio::test]
    async fn unreachable_fraud_fails_confirmation() {
        let (state, sink, exporter) = state("notification", [0], fast_settings());
        let response = router(state)
            .oneshot(request(r#"{"card_id":"123"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        sink.flush().await;
        let spans = exporter.spans();
        let check = spans.iter().find(|s| s.name == "check-fraud").unwrap();
        assert!(check.is_error());
    }

    #[tokio::test]
    async fn active_status_confirms_notification() {
        let (status, spans) = confirm_against(r#"{"status":"active"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let check = spans.iter().find(|s| s.name == "check-fraud").unwrap();
        assert!(!check.is_error());
    }

    #[tokio::test]
    async fn inactive_status_fails_confirmation() {
        let (status, spans) = confirm_against(r#"{"status":"frozen"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let check = spans.iter().find(|s| s.name == "check-fraud").unwrap();
        assert!(check.is_error());
        assert!(check.error.as_deref().unwrap().contains("frozen"));
        let entry = spans
            .iter()
            .find(|s| s.name == "HTTP POST /api/notification")
            .unwrap();
        assert!(entry.is_error());
        assert_eq!(entry.attribute("error"), Some(&AttrValue::Bool(true)));
    }

    #[tokio::test]
    async fn undecodable_status_fails_confirmation() {
        let (status, spans) = confirm_against("not json").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let check = spans.iter().find(|s| s.name == "check-fraud").unwrap();
        assert!(check.is_error());
        let entry = spans
            .iter()
            .find(|s| s.name == "HTTP POST /api/notification")
            .unwrap();
        assert_eq!(entry.attribute("error"), Some(&AttrValue::Bool(true)));
    }
}
