use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PaytraceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub payment_addr: String,
    pub fraud_addr: String,
    pub notification_addr: String,
    pub payment_url: String,
    pub fraud_url: String,
    pub notification_url: String,
    pub downstream_timeout: Duration,
    pub delay_unit: Duration,
    pub save_delay_bound: u64,
    pub save_failure_threshold: u64,
    pub score_delay: Duration,
    pub status_check_delay: Duration,
    pub confirm_status: bool,
    pub seed: Option<u64>,
    pub service_version: String,
    pub environment: String,
    pub export_otlp_endpoint: Option<String>,
    pub export_otlp_protocol: String,
    pub export_otlp_compression: String,
    pub export_otlp_headers: Vec<(String, String)>,
    pub export_otlp_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payment_addr: "127.0.0.1:9000".to_string(),
            fraud_addr: "127.0.0.1:9001".to_string(),
            notification_addr: "127.0.0.1:9003".to_string(),
            payment_url: "http://127.0.0.1:9000".to_string(),
            fraud_url: "http://127.0.0.1:9001".to_string(),
            notification_url: "http://127.0.0.1:9003".to_string(),
            downstream_timeout: Duration::from_secs(3),
            delay_unit: Duration::from_secs(1),
            save_delay_bound: 5,
            save_failure_threshold: 2,
            score_delay: Duration::from_millis(800),
            status_check_delay: Duration::from_millis(250),
            confirm_status: true,
            seed: None,
            service_version: "v0.1.0".to_string(),
            environment: "staging".to_string(),
            export_otlp_endpoint: None,
            export_otlp_protocol: "grpc".to_string(),
            export_otlp_compression: "none".to_string(),
            export_otlp_headers: Vec::new(),
            export_otlp_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.save_delay_bound == 0 {
            return Err(PaytraceError::Config(
                "save_delay_bound must be at least 1".to_string(),
            ));
        }
        if self.downstream_timeout.is_zero() {
            return Err(PaytraceError::Config(
                "downstream_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    payment_addr: Option<String>,
    fraud_addr: Option<String>,
    notification_addr: Option<String>,
    payment_url: Option<String>,
    fraud_url: Option<String>,
    notification_url: Option<String>,
    downstream_timeout: Option<String>,
    delay_unit: Option<String>,
    save_delay_bound: Option<u64>,
    save_failure_threshold: Option<u64>,
    score_delay: Option<String>,
    status_check_delay: Option<String>,
    confirm_status: Option<bool>,
    seed: Option<u64>,
    service_version: Option<String>,
    environment: Option<String>,
    export_otlp_endpoint: Option<String>,
    export_otlp_protocol: Option<String>,
    export_otlp_compression: Option<String>,
    export_otlp_headers: Option<String>,
    export_otlp_timeout: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("PAYTRACE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("paytrace/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| PaytraceError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| PaytraceError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    env_overrides_from(|name| env::var(name).ok())
}

fn env_overrides_from(var: impl Fn(&str) -> Option<String>) -> Result<ConfigOverrides> {
    let parse_u64 = |name: &str| -> Result<Option<u64>> {
        var(name)
            .map(|v| {
                v.parse::<u64>().map_err(|e| {
                    PaytraceError::Config(format!("bad {name} in environment: {e} (value={v})"))
                })
            })
            .transpose()
    };
    let confirm_status = match var("PAYTRACE_CONFIRM_STATUS") {
        Some(v) => Some(parse_bool(&v).ok_or_else(|| {
            PaytraceError::Config(format!(
                "bad PAYTRACE_CONFIRM_STATUS in environment: {v}"
            ))
        })?),
        None => None,
    };

    Ok(ConfigOverrides {
        payment_addr: var("PAYTRACE_PAYMENT_ADDR"),
        fraud_addr: var("PAYTRACE_FRAUD_ADDR"),
        notification_addr: var("PAYTRACE_NOTIFICATION_ADDR"),
        payment_url: var("PAYTRACE_PAYMENT_URL"),
        fraud_url: var("PAYTRACE_FRAUD_URL"),
        notification_url: var("PAYTRACE_NOTIFICATION_URL"),
        downstream_timeout: var("PAYTRACE_DOWNSTREAM_TIMEOUT"),
        delay_unit: var("PAYTRACE_DELAY_UNIT"),
        save_delay_bound: parse_u64("PAYTRACE_SAVE_DELAY_BOUND")?,
        save_failure_threshold: parse_u64("PAYTRACE_SAVE_FAILURE_THRESHOLD")?,
        score_delay: var("PAYTRACE_SCORE_DELAY"),
        status_check_delay: var("PAYTRACE_STATUS_CHECK_DELAY"),
        confirm_status,
        seed: parse_u64("PAYTRACE_SEED")?,
        service_version: var("PAYTRACE_SERVICE_VERSION"),
        environment: var("PAYTRACE_ENVIRONMENT"),
        export_otlp_endpoint: var("PAYTRACE_EXPORT_OTLP_ENDPOINT")
            .or_else(|| var("OTEL_EXPORTER_OTLP_ENDPOINT")),
        export_otlp_protocol: var("PAYTRACE_EXPORT_OTLP_PROTOCOL"),
        export_otlp_compression: var("PAYTRACE_EXPORT_OTLP_COMPRESSION"),
        export_otlp_headers: var("PAYTRACE_EXPORT_OTLP_HEADERS"),
        export_otlp_timeout: var("PAYTRACE_EXPORT_OTLP_TIMEOUT"),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.payment_addr {
        cfg.payment_addr = v;
    }
    if let Some(v) = overrides.fraud_addr {
        cfg.fraud_addr = v;
    }
    if let Some(v) = overrides.notification_addr {
        cfg.notification_addr = v;
    }
    if let Some(v) = overrides.payment_url {
        cfg.payment_url = v;
    }
    if let Some(v) = overrides.fraud_url {
        cfg.fraud_url = v;
    }
    if let Some(v) = overrides.notification_url {
        cfg.notification_url = v;
    }
    if let Some(v) = overrides.downstream_timeout {
        cfg.downstream_timeout = parse_duration_field(&v, "downstream_timeout", source)?;
    }
    if let Some(v) = overrides.delay_unit {
        cfg.delay_unit = parse_duration_field(&v, "delay_unit", source)?;
    }
    if let Some(v) = overrides.save_delay_bound {
        cfg.save_delay_bound = v;
    }
    if let Some(v) = overrides.save_failure_threshold {
        cfg.save_failure_threshold = v;
    }
    if let Some(v) = overrides.score_delay {
        cfg.score_delay = parse_duration_field(&v, "score_delay", source)?;
    }
    if let Some(v) = overrides.status_check_delay {
        cfg.status_check_delay = parse_duration_field(&v, "status_check_delay", source)?;
    }
    if let Some(v) = overrides.confirm_status {
        cfg.confirm_status = v;
    }
    if let Some(v) = overrides.seed {
        cfg.seed = Some(v);
    }
    if let Some(v) = overrides.service_version {
        cfg.service_version = v;
    }
    if let Some(v) = overrides.environment {
        cfg.environment = v;
    }
    if let Some(v) = overrides.export_otlp_endpoint {
        cfg.export_otlp_endpoint = Some(v);
    }
    if let Some(v) = overrides.export_otlp_protocol {
        cfg.export_otlp_protocol = v;
    }
    if let Some(v) = overrides.export_otlp_compression {
        cfg.export_otlp_compression = v;
    }
    if let Some(v) = overrides.export_otlp_headers {
        cfg.export_otlp_headers = parse_otlp_headers(&v).map_err(|e| {
            PaytraceError::Config(format!(
                "bad export_otlp_headers in {source}: {e} (value={v})"
            ))
        })?;
    }
    if let Some(v) = overrides.export_otlp_timeout {
        cfg.export_otlp_timeout = parse_duration_field(&v, "export_otlp_timeout", source)?;
    }
    Ok(())
}

fn parse_duration_field(raw: &str, field: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(raw).map_err(|e| {
        PaytraceError::Config(format!("bad {field} in {source}: {e} (value={raw})"))
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_otlp_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(PaytraceError::Config(
                "header entries must use key=value syntax".to_string(),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(PaytraceError::Config("header key cannot be empty".to_string()));
        }
        out.push((key.to_string(), value.trim().to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_expected_ports() {
        let cfg = Config::default();
        assert_eq!(cfg.payment_addr, "127.0.0.1:9000");
        assert_eq!(cfg.fraud_addr, "127.0.0.1:9001");
        assert_eq!(cfg.notification_addr, "127.0.0.1:9003");
    }

    #[test]
    fn default_latency_model_is_seconds_based() {
        let cfg = Config::default();
        assert_eq!(cfg.downstream_timeout, Duration::from_secs(3));
        assert_eq!(cfg.delay_unit, Duration::from_secs(1));
        assert_eq!(cfg.save_delay_bound, 5);
        assert_eq!(cfg.save_failure_threshold, 2);
        assert_eq!(cfg.score_delay, Duration::from_millis(800));
        assert_eq!(cfg.status_check_delay, Duration::from_millis(250));
        assert!(cfg.confirm_status);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_otlp_headers_accepts_list() {
        let headers = parse_otlp_headers("x-tenant=dev,authorization=Bearer token").unwrap();
        assert_eq!(
            headers,
            vec![
                ("x-tenant".to_string(), "dev".to_string()),
                ("authorization".to_string(), "Bearer token".to_string())
            ]
        );
    }

    #[test]
    fn parse_otlp_headers_rejects_bad_entries() {
        assert!(parse_otlp_headers("x-tenant").is_err());
        assert!(parse_otlp_headers("=dev").is_err());
    }

    #[test]
    fn file_overrides_parse_from_toml() {
        let raw = r#"
            fraud_url = "http://fraud.internal:9001"
            delay_unit = "10ms"
            save_delay_bound = 3
            confirm_status = false
            seed = 9
        "#;
        let overrides: ConfigOverrides = toml::from_str(raw).unwrap();
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, overrides, "config file").unwrap();

        assert_eq!(cfg.fraud_url, "http://fraud.internal:9001");
        assert_eq!(cfg.delay_unit, Duration::from_millis(10));
        assert_eq!(cfg.save_delay_bound, 3);
        assert!(!cfg.confirm_status);
        assert_eq!(cfg.seed, Some(9));
    }

    #[test]
    fn apply_overrides_updates_export_fields() {
        let mut cfg = Config::default();
        let file = ConfigOverrides {
            export_otlp_endpoint: Some("http://127.0.0.1:4317".to_string()),
            export_otlp_protocol: Some("http/protobuf".to_string()),
            export_otlp_compression: Some("gzip".to_string()),
            export_otlp_headers: Some("x-tenant=dev".to_string()),
            export_otlp_timeout: Some("3s".to_string()),
            ..ConfigOverrides::default()
        };

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(
            cfg.export_otlp_endpoint,
            Some("http://127.0.0.1:4317".to_string())
        );
        assert_eq!(cfg.export_otlp_protocol, "http/protobuf");
        assert_eq!(cfg.export_otlp_compression, "gzip");
        assert_eq!(
            cfg.export_otlp_headers,
            vec![("x-tenant".to_string(), "dev".to_string())]
        );
        assert_eq!(cfg.export_otlp_timeout, Duration::from_secs(3));
    }

    #[test]
    fn bad_duration_reports_source() {
        let mut cfg = Config::default();
        let overrides = ConfigOverrides {
            downstream_timeout: Some("soon".to_string()),
            ..ConfigOverrides::default()
        };
        let err = apply_overrides(&mut cfg, overrides, "environment").unwrap_err();
        assert!(err.to_string().contains("downstream_timeout in environment"));
    }

    #[test]
    fn validate_rejects_empty_save_range() {
        let cfg = Config {
            save_delay_bound: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("FALSE"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_save_profile() {
        let overrides = env_overrides_from(env_of(&[
            ("PAYTRACE_SAVE_DELAY_BOUND", "8"),
            ("PAYTRACE_SAVE_FAILURE_THRESHOLD", "6"),
            ("PAYTRACE_SEED", "42"),
        ]))
        .unwrap();
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, overrides, "environment").unwrap();
        assert_eq!(cfg.save_delay_bound, 8);
        assert_eq!(cfg.save_failure_threshold, 6);
        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.delay_unit, Duration::from_secs(1));
    }

    #[test]
    fn env_rejects_non_numeric_save_bound() {
        let err = env_overrides_from(env_of(&[("PAYTRACE_SAVE_DELAY_BOUND", "five")]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("PAYTRACE_SAVE_DELAY_BOUND"));
    }

    #[test]
    fn otlp_endpoint_falls_back_to_standard_variable() {
        let overrides = env_overrides_from(env_of(&[(
            "OTEL_EXPORTER_OTLP_ENDPOINT",
            "http://collector:4317",
        )]))
        .unwrap();
        assert_eq!(
            overrides.export_otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }
}
