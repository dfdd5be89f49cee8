use std::time::Duration;

use paytrace_core::TraceContext;
use paytrace_trace::propagation;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::HopError;

/// Outbound JSON calls to downstream hops, carrying the caller's trace context.
#[derive(Clone)]
pub struct HopClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl HopClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default http client");
                reqwest::Client::new()
            });
        Self { http, timeout }
    }

    /// POSTs `body` and requires a 2xx answer. The response body is ignored.
    pub async fn post_json<B: Serialize>(
        &self,
        target: &str,
        url: &str,
        body: &B,
        ctx: &TraceContext,
    ) -> Result<(), HopError> {
        let request = self
            .http
            .post(url)
            .headers(trace_headers(ctx))
            .timeout(self.timeout)
            .json(body);
        let response = request.send().await.map_err(|e| self.classify(target, e))?;
        check_status(target, &response)?;
        debug!(target_hop = target, url, "downstream call succeeded");
        Ok(())
    }

    /// GET with a JSON body, decoding a JSON answer.
    pub async fn get_json<B: Serialize, R: DeserializeOwned>(
        &self,
        target: &str,
        url: &str,
        body: &B,
        ctx: &TraceContext,
    ) -> Result<R, HopError> {
        let request = self
            .http
            .get(url)
            .headers(trace_headers(ctx))
            .timeout(self.timeout)
            .json(body);
        let response = request.send().await.map_err(|e| self.classify(target, e))?;
        check_status(target, &response)?;
        response
            .json::<R>()
            .await
            .map_err(|e| self.classify(target, e))
    }

    fn classify(&self, target: &str, err: reqwest::Error) -> HopError {
        if err.is_timeout() {
            HopError::Timeout {
                target: target.to_string(),
                timeout: self.timeout,
            }
        } else {
            HopError::Downstream {
                target: target.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

fn trace_headers(ctx: &TraceContext) -> HeaderMap {
    let mut headers = HeaderMap::new();
    propagation::inject(ctx, &mut headers);
    headers
}

fn check_status(target: &str, response: &reqwest::Response) -> Result<(), HopError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(HopError::Downstream {
        target: target.to_string(),
        reason: format!("status {}", status.as_u16()),
    })
}

/// Joins a base url and an absolute route without doubling the slash.
pub fn endpoint(base: &str, route: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), route)
}
