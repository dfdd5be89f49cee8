use std::sync::Arc;
use std::time::Duration;

use paytrace_core::config::Config;
use paytrace_trace::Tracer;

use crate::client::HopClient;
use crate::injector::{Injector, WorkProfile};

/// Knobs shared by every handler of a hop.
#[derive(Debug, Clone)]
pub struct HopSettings {
    pub fraud_url: String,
    pub notification_url: String,
    pub save_profile: WorkProfile,
    pub score_delay: Duration,
    pub status_check_delay: Duration,
    pub confirm_status: bool,
}

impl HopSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            fraud_url: cfg.fraud_url.clone(),
            notification_url: cfg.notification_url.clone(),
            save_profile: WorkProfile {
                delay_bound: cfg.save_delay_bound,
                failure_threshold: cfg.save_failure_threshold,
            },
            score_delay: cfg.score_delay,
            status_check_delay: cfg.status_check_delay,
            confirm_status: cfg.confirm_status,
        }
    }
}

#[derive(Clone)]
pub struct HopState {
    pub tracer: Tracer,
    pub injector: Injector,
    pub client: HopClient,
    pub settings: Arc<HopSettings>,
}
