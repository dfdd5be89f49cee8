use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use paytrace_core::model::payment::{
    FraudVerdict, NotificationRecord, PaymentRequest, StatusCheckRequest, StatusCheckResponse,
};
use paytrace_trace::{Span, propagation};
use tracing::{debug, info, warn};

use crate::client::endpoint;
use crate::error::{HopError, decode_json};
use crate::notification;
use crate::state::HopState;

pub const ROUTE: &str = "/api/fraud";

pub fn router(state: HopState) -> Router {
    Router::new()
        .route(ROUTE, post(score_payment).get(check_status))
        .with_state(state)
}

async fn score_payment(
    State(state): State<HopState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parent = propagation::extract(&headers);
    let mut span = state.tracer.start_entry("HTTP POST /api/fraud", parent.as_ref());
    match score_and_notify(&state, &span, &body).await {
        Ok(verdict) => {
            info!(
                trace_id = %span.context().trace_id(),
                approved = verdict.approved,
                "payment scored"
            );
            StatusCode::OK.into_response()
        }
        Err(err) => {
            warn!(trace_id = %span.context().trace_id(), error = %err, "scoring failed");
            span.record_error(&err);
            err.into_response()
        }
    }
}

async fn score_and_notify(
    state: &HopState,
    span: &Span,
    body: &[u8],
) -> Result<FraudVerdict, HopError> {
    let request: PaymentRequest = decode_json(body)?;
    let approved = calculate_score(state, span).await;
    let verdict = FraudVerdict {
        card_id: request.card_id,
        amount: request.amount,
        approved,
    };
    save_score(state, span, &verdict).await?;
    send_notification(state, span, &verdict.card_id).await?;
    Ok(verdict)
}

/// Fixed latency, random verdict. Never fails.
async fn calculate_score(state: &HopState, parent: &Span) -> bool {
    let mut span = parent.child("calculate-score");
    state.injector.fixed_delay(state.settings.score_delay).await;
    let approved = state.injector.coin();
    span.set_attribute("approved", approved);
    approved
}

async fn save_score(state: &HopState, parent: &Span, verdict: &FraudVerdict) -> Result<(), HopError> {
    let mut span = parent.child("save-score");
    span.set_attribute("approved", verdict.approved);
    state
        .injector
        .save(&mut span, state.settings.save_profile, "timeout saving score")
        .await
}

async fn send_notification(state: &HopState, parent: &Span, card_id: &str) -> Result<(), HopError> {
    let mut span = parent.client_child("notification-call");
    let url = endpoint(&state.settings.notification_url, notification::ROUTE);
    let record = NotificationRecord {
        card_id: card_id.to_string(),
    };
    let result = state
        .client
        .post_json("notification", &url, &record, span.context())
        .await;
    if let Err(err) = &result {
        span.record_error(err);
    }
    result
}

async fn check_status(
    State(state): State<HopState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parent = propagation::extract(&headers);
    let mut span = state.tracer.start_entry("HTTP GET /api/fraud", parent.as_ref());
    let request: StatusCheckRequest = match decode_json(&body) {
        Ok(request) => request,
        Err(err) => {
            span.record_error(&err);
            return err.into_response();
        }
    };
    state.injector.fixed_delay(state.settings.status_check_delay).await;
    debug!(card_id = %request.card_id, "status check answered");
    (StatusCode::OK, Json(StatusCheckResponse::active())).into_response()
}
