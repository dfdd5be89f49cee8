//! `traceparent` header injection and extraction.
//!
//! Extraction never fails a request: a missing or malformed header simply
//! means the receiving hop starts a new trace.

use http::{HeaderMap, HeaderValue};
use paytrace_core::{TRACEPARENT_HEADER, TraceContext};

pub fn inject(ctx: &TraceContext, headers: &mut HeaderMap) {
    match HeaderValue::from_str(&ctx.to_traceparent()) {
        Ok(value) => {
            headers.insert(TRACEPARENT_HEADER, value);
        }
        Err(err) => tracing::warn!(error = %err, "failed to encode traceparent header"),
    }
}

pub fn extract(headers: &HeaderMap) -> Option<TraceContext> {
    let raw = headers.get(TRACEPARENT_HEADER)?;
    let Ok(raw) = raw.to_str() else {
        tracing::debug!("ignoring non-ascii traceparent header");
        return None;
    };
    match TraceContext::from_traceparent(raw) {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring malformed traceparent header");
            None
        }
    }
}
