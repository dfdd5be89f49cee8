//! Synthetic client traffic against the payment hop.
//!
//! Each client ticks at a fixed interval and fires one payment per tick
//! without waiting for the previous one, so slow or failing hops pile up
//! concurrent requests the way real callers would.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use owo_colors::OwoColorize;
use paytrace_core::model::payment::{PaymentRequest, PaymentResponse};
use paytrace_core::random::RandomSource;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

const MAX_AMOUNT: u64 = 5000;

#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Base url of the payment hop.
    pub target: String,
    pub clients: usize,
    pub interval: Duration,
    pub duration: Option<Duration>,
    pub requests: Option<u64>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub sent: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

impl LoadReport {
    pub fn success_rate(&self) -> f64 {
        let done = self.succeeded + self.failed;
        if done == 0 {
            return 0.0;
        }
        self.succeeded as f64 / done as f64
    }
}

struct Shared {
    cfg: LoadConfig,
    url: String,
    http: reqwest::Client,
    random: Arc<dyn RandomSource>,
    sent: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    /// Claims one request slot, or reports that the budget is spent.
    fn reserve(&self) -> bool {
        match self.cfg.requests {
            None => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(max) => self
                .sent
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    (n < max).then_some(n + 1)
                })
                .is_ok(),
        }
    }
}

/// Runs until the duration elapses, the request budget is spent or
/// `shutdown` resolves, then waits for in-flight requests.
pub async fn run_load(
    cfg: LoadConfig,
    random: Arc<dyn RandomSource>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<LoadReport> {
    if cfg.interval.is_zero() {
        anyhow::bail!("load interval must be non-zero");
    }
    let http = reqwest::Client::builder().timeout(cfg.timeout).build()?;
    let url = format!("{}/api/payment", cfg.target.trim_end_matches('/'));
    let clients = cfg.clients.max(1);
    let duration = cfg.duration;
    let shared = Arc::new(Shared {
        cfg,
        url,
        http,
        random,
        sent: AtomicU64::new(0),
        succeeded: AtomicU64::new(0),
        failed: AtomicU64::new(0),
    });

    info!(clients, url = %shared.url, "starting load");
    let started = Instant::now();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for client in 0..clients {
        tasks.spawn(client_loop(client, shared.clone(), stop_rx.clone()));
    }

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    let mut crashed = None;
    tokio::select! {
        _ = deadline => debug!("load duration elapsed"),
        _ = shutdown => info!("load interrupted"),
        _ = join_clients(&mut tasks, &mut crashed) => debug!("request budget spent"),
    }
    let _ = stop_tx.send(true);
    join_clients(&mut tasks, &mut crashed).await;
    if let Some(err) = crashed {
        return Err(anyhow::Error::new(err).context("load client failed"));
    }

    Ok(LoadReport {
        sent: shared.sent.load(Ordering::Relaxed),
        succeeded: shared.succeeded.load(Ordering::Relaxed),
        failed: shared.failed.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    })
}

async fn join_clients(tasks: &mut JoinSet<()>, crashed: &mut Option<JoinError>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res {
            warn!(error = %err, "load client stopped abnormally");
            crashed.get_or_insert(err);
        }
    }
}

async fn client_loop(client: usize, shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.cfg.interval);
    let mut inflight = JoinSet::new();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !shared.reserve() {
                    break;
                }
                inflight.spawn(send_payment(client, shared.clone()));
            }
            Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
            _ = stop.changed() => break,
        }
    }
    while inflight.join_next().await.is_some() {}
}

async fn send_payment(client: usize, shared: Arc<Shared>) {
    let request = PaymentRequest {
        card_id: (shared.random.next_u64() & i64::MAX as u64).to_string(),
        amount: shared.random.below(MAX_AMOUNT).to_string(),
    };
    debug!(client, card_id = %request.card_id, amount = %request.amount, "sending payment");

    match post_payment(&shared, &request).await {
        Ok(id) => {
            shared.succeeded.fetch_add(1, Ordering::Relaxed);
            debug!(client, payment_id = %id, "payment created");
        }
        Err(reason) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            warn!(client, card_id = %request.card_id, %reason, "payment failed");
        }
    }
}

async fn post_payment(shared: &Shared, request: &PaymentRequest) -> Result<String, String> {
    let response = shared
        .http
        .post(&shared.url)
        .json(request)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("status {}", status.as_u16()));
    }
    let body = response.bytes().await.map_err(|e| e.to_string())?;
    serde_json::from_slice::<PaymentResponse>(&body)
        .map(|p| p.id)
        .map_err(|e| format!("bad payment response: {e}"))
}

pub fn print_report(report: &LoadReport) {
    println!(
        "load finished in {}",
        humantime::format_duration(Duration::from_millis(report.elapsed.as_millis() as u64))
    );
    println!("  sent       {}", report.sent);
    println!("  succeeded  {}", report.succeeded.green());
    println!("  failed     {}", report.failed.red());
    let rate = format!("{:.1}%", report.success_rate() * 100.0);
    if report.failed == 0 {
        println!("  success    {}", rate.green());
    } else {
        println!("  success    {}", rate.yellow());
    }
}
