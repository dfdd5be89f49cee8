use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use paytrace_core::model::payment::{PaymentRecord, PaymentRequest, PaymentResponse};
use paytrace_trace::{Span, propagation};
use tracing::{info, warn};

use crate::client::endpoint;
use crate::error::{HopError, decode_json};
use crate::fraud;
use crate::state::HopState;

pub const ROUTE: &str = "/api/payment";
const ENTRY_SPAN: &str = "HTTP POST /api/payment";

pub fn router(state: HopState) -> Router {
    Router::new()
        .route(ROUTE, post(process_payment))
        .with_state(state)
}

async fn process_payment(
    State(state): State<HopState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parent = propagation::extract(&headers);
    let mut span = state.tracer.start_entry(ENTRY_SPAN, parent.as_ref());
    let outcome = accept_payment(&state, &span, &body).await;
    match outcome {
        Ok(record) => {
            info!(
                trace_id = %span.context().trace_id(),
                payment_id = record.payment_id,
                "payment accepted"
            );
            (StatusCode::OK, Json(PaymentResponse::from(record))).into_response()
        }
        Err(err) => {
            warn!(trace_id = %span.context().trace_id(), error = %err, "payment rejected");
            span.record_error(&err);
            err.into_response()
        }
    }
}

async fn accept_payment(
    state: &HopState,
    span: &Span,
    body: &[u8],
) -> Result<PaymentRecord, HopError> {
    let request: PaymentRequest = decode_json(body)?;
    let record = PaymentRecord::generate(state.injector.random());
    fraud_scoring_check(state, span, &request).await?;
    save_payment(state, span, record).await?;
    Ok(record)
}

async fn fraud_scoring_check(
    state: &HopState,
    parent: &Span,
    request: &PaymentRequest,
) -> Result<(), HopError> {
    let mut span = parent.client_child("fraud-scoring-call");
    let url = endpoint(&state.settings.fraud_url, fraud::ROUTE);
    let result = state
        .client
        .post_json("fraud", &url, request, span.context())
        .await;
    if let Err(err) = &result {
        span.record_error(err);
    }
    result
}

async fn save_payment(state: &HopState, parent: &Span, record: PaymentRecord) -> Result<(), HopError> {
    let mut span = parent.child("save-payment");
    span.set_attribute("payment.id", record.payment_id.to_string());
    state
        .injector
        .save(&mut span, state.settings.save_profile, "save timeout")
        .await
}
