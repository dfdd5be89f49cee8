use std::sync::Arc;

use axum::Router;
use paytrace_core::config::Config;
use paytrace_core::error::{PaytraceError, Result};
use paytrace_core::random::RandomSource;
use paytrace_trace::{SpanSink, Tracer};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::client::HopClient;
use crate::injector::Injector;
use crate::state::{HopSettings, HopState};
use crate::{fraud, notification, payment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hop {
    Payment,
    Fraud,
    Notification,
}

impl Hop {
    pub const ALL: [Hop; 3] = [Hop::Payment, Hop::Fraud, Hop::Notification];

    /// Service name stamped on every span the hop emits.
    pub fn service_name(self) -> &'static str {
        match self {
            Hop::Payment => "payments",
            Hop::Fraud => "fraud",
            Hop::Notification => "notification",
        }
    }

    pub fn listen_addr(self, cfg: &Config) -> &str {
        match self {
            Hop::Payment => &cfg.payment_addr,
            Hop::Fraud => &cfg.fraud_addr,
            Hop::Notification => &cfg.notification_addr,
        }
    }

    pub fn router(self, state: HopState) -> Router {
        let router = match self {
            Hop::Payment => payment::router(state),
            Hop::Fraud => fraud::router(state),
            Hop::Notification => notification::router(state),
        };
        with_request_logging(router)
    }
}

impl std::fmt::Display for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.service_name())
    }
}

pub fn with_request_logging<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        TraceLayer::new_for_http()
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

pub fn build_state(
    hop: Hop,
    cfg: &Config,
    sink: SpanSink,
    random: Arc<dyn RandomSource>,
) -> HopState {
    HopState {
        tracer: Tracer::new(hop.service_name(), sink, random.clone()),
        injector: Injector::new(random, cfg.delay_unit),
        client: HopClient::new(cfg.downstream_timeout),
        settings: Arc::new(HopSettings::from_config(cfg)),
    }
}

pub async fn serve_hop(hop: Hop, listener: TcpListener, state: HopState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(hop = %hop, %addr, "hop listening");
    axum::serve(listener, hop.router(state))
        .await
        .map_err(|e| PaytraceError::Internal(format!("{hop} server failed: {e}")))
}

/// Binds every listener first so a port conflict fails before any hop serves.
pub async fn bind_hops(hops: &[Hop], cfg: &Config) -> Result<Vec<(Hop, TcpListener)>> {
    let mut bound = Vec::with_capacity(hops.len());
    for &hop in hops {
        let addr = hop.listen_addr(cfg);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PaytraceError::Io(format!("bind {hop} on {addr}: {e}")))?;
        bound.push((hop, listener));
    }
    Ok(bound)
}

/// Serves every bound hop until one of them stops.
pub async fn run_hops(bindings: Vec<(Hop, TcpListener, HopState)>) -> Result<()> {
    let mut tasks = JoinSet::new();
    for (hop, listener, state) in bindings {
        tasks.spawn(serve_hop(hop, listener, state));
    }
    match tasks.join_next().await {
        Some(Ok(res)) => res,
        Some(Err(e)) => Err(PaytraceError::Internal(format!("hop task join failed: {e}"))),
        None => Ok(()),
    }
}
