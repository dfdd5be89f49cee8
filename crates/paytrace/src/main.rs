mod load;
mod telemetry;

use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use paytrace_core::config::Config;
use paytrace_core::random::random_source;
use paytrace_services::{Hop, bind_hops, build_state, run_hops};

use crate::load::{LoadConfig, print_report, run_load};
use crate::telemetry::{build_span_sink, init_cli_tracing, init_run_tracing};

#[derive(Parser, Debug)]
#[command(name = "paytrace")]
#[command(about = "Traced payment pipeline with latency and failure injection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Serve the payment hop")]
    Payment {
        #[arg(long)]
        addr: Option<String>,
        #[command(flatten)]
        hop: HopArgs,
    },
    #[command(about = "Serve the fraud hop")]
    Fraud {
        #[arg(long)]
        addr: Option<String>,
        #[command(flatten)]
        hop: HopArgs,
    },
    #[command(about = "Serve the notification hop")]
    Notification {
        #[arg(long)]
        addr: Option<String>,
        #[command(flatten)]
        hop: HopArgs,
    },
    #[command(about = "Serve all three hops in one process")]
    Run {
        #[arg(long)]
        payment_addr: Option<String>,
        #[arg(long)]
        fraud_addr: Option<String>,
        #[arg(long)]
        notification_addr: Option<String>,
        #[command(flatten)]
        hop: HopArgs,
    },
    #[command(about = "Send synthetic payments to the payment hop")]
    Load {
        #[arg(long, help = "Payment hop base url (defaults to payment_url)")]
        target: Option<String>,
        #[arg(long, default_value_t = 16)]
        clients: usize,
        #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
        interval: Duration,
        #[arg(long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,
        #[arg(long, help = "Stop after this many payments")]
        requests: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args, Debug, Default)]
struct HopArgs {
    #[arg(long, help = "Seed for reproducible delays, verdicts and ids")]
    seed: Option<u64>,
    #[arg(long, value_parser = humantime::parse_duration, help = "Length of one simulated delay unit")]
    delay_unit: Option<Duration>,
    #[arg(long, value_parser = humantime::parse_duration)]
    downstream_timeout: Option<Duration>,
    #[arg(long, help = "Skip the notification hop's fraud status check")]
    no_status_check: bool,
}

impl HopArgs {
    /// Layers the flags over `cfg` and re-checks the result.
    fn apply(self, cfg: &mut Config) -> anyhow::Result<()> {
        if let Some(v) = self.seed {
            cfg.seed = Some(v);
        }
        if let Some(v) = self.delay_unit {
            cfg.delay_unit = v;
        }
        if let Some(v) = self.downstream_timeout {
            cfg.downstream_timeout = v;
        }
        if self.no_status_check {
            cfg.confirm_status = false;
        }
        cfg.validate().context("invalid command-line overrides")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load().context("load config")?;

    match cli.command {
        Commands::Payment { addr, hop } => {
            if let Some(v) = addr {
                cfg.payment_addr = v;
            }
            hop.apply(&mut cfg)?;
            serve(&[Hop::Payment], cfg, cli.json_logs, false).await
        }
        Commands::Fraud { addr, hop } => {
            if let Some(v) = addr {
                cfg.fraud_addr = v;
            }
            hop.apply(&mut cfg)?;
            serve(&[Hop::Fraud], cfg, cli.json_logs, false).await
        }
        Commands::Notification { addr, hop } => {
            if let Some(v) = addr {
                cfg.notification_addr = v;
            }
            hop.apply(&mut cfg)?;
            serve(&[Hop::Notification], cfg, cli.json_logs, false).await
        }
        Commands::Run {
            payment_addr,
            fraud_addr,
            notification_addr,
            hop,
        } => {
            if let Some(v) = payment_addr {
                cfg.payment_addr = v;
            }
            if let Some(v) = fraud_addr {
                cfg.fraud_addr = v;
            }
            if let Some(v) = notification_addr {
                cfg.notification_addr = v;
            }
            hop.apply(&mut cfg)?;
            serve(&Hop::ALL, cfg, cli.json_logs, true).await
        }
        Commands::Load {
            target,
            clients,
            interval,
            duration,
            requests,
            seed,
        } => {
            init_cli_tracing();
            let load_cfg = LoadConfig {
                target: target.unwrap_or_else(|| cfg.payment_url.clone()),
                clients,
                interval,
                duration,
                requests,
                timeout: cfg.downstream_timeout * 4,
            };
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let report = run_load(load_cfg, random_source(seed.or(cfg.seed)), shutdown).await?;
            print_report(&report);
            Ok(())
        }
    }
}

/// Binds and serves `hops` until one fails or ctrl-c arrives, then flushes
/// pending spans. With `local_urls` the downstream urls point at the
/// listeners bound here.
async fn serve(hops: &[Hop], mut cfg: Config, json_logs: bool, local_urls: bool) -> anyhow::Result<()> {
    init_run_tracing(json_logs);

    let listeners = bind_hops(hops, &cfg).await.context("bind hop listeners")?;
    if local_urls {
        for (hop, listener) in &listeners {
            let url = format!("http://{}", listener.local_addr()?);
            match hop {
                Hop::Payment => cfg.payment_url = url,
                Hop::Fraud => cfg.fraud_url = url,
                Hop::Notification => cfg.notification_url = url,
            }
        }
    }

    let sink = build_span_sink(&cfg)?;
    let random = random_source(cfg.seed);

    let label = match hops {
        [hop] => hop.service_name(),
        _ => "run",
    };
    eprintln!("paytrace {label}");
    for (hop, listener) in &listeners {
        eprintln!("  {hop}: http://{}", listener.local_addr()?);
    }
    eprintln!("  fraud url: {}", cfg.fraud_url);
    eprintln!("  notification url: {}", cfg.notification_url);
    match &cfg.export_otlp_endpoint {
        Some(endpoint) => eprintln!("  spans: otlp {endpoint} ({})", cfg.export_otlp_protocol),
        None => eprintln!("  spans: log"),
    }
    eprintln!(
        "  delay unit: {}",
        humantime::format_duration(cfg.delay_unit)
    );

    let bindings = listeners
        .into_iter()
        .map(|(hop, listener)| {
            let state = build_state(hop, &cfg, sink.clone(), random.clone());
            (hop, listener, state)
        })
        .collect();

    tokio::select! {
        res = run_hops(bindings) => {
            res.context("serve hops")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    sink.flush().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_downstream_timeout_flag_is_rejected() {
        let mut cfg = Config::default();
        let args = HopArgs {
            downstream_timeout: Some(Duration::ZERO),
            ..HopArgs::default()
        };
        assert!(args.apply(&mut cfg).is_err());
    }

    #[test]
    fn hop_flags_override_config() {
        let mut cfg = Config::default();
        let args = HopArgs {
            seed: Some(11),
            delay_unit: Some(Duration::from_millis(5)),
            downstream_timeout: None,
            no_status_check: true,
        };
        args.apply(&mut cfg).unwrap();
        assert_eq!(cfg.seed, Some(11));
        assert_eq!(cfg.delay_unit, Duration::from_millis(5));
        assert!(!cfg.confirm_status);
    }

    #[test]
    fn cli_parses_load_flags() {
        let cli = Cli::try_parse_from([
            "paytrace", "load", "--clients", "4", "--interval", "250ms", "--requests", "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Load {
                clients,
                interval,
                requests,
                ..
            } => {
                assert_eq!(clients, 4);
                assert_eq!(interval, Duration::from_millis(250));
                assert_eq!(requests, Some(10));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
