use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::span::{Event, SpanKind as OtlpSpanKind};
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span as OtlpSpan, Status};
use paytrace_core::model::span::{AttrValue, SpanKind, SpanRecord, SpanStatus};

const SCOPE_NAME: &str = "paytrace";

/// Resource attributes attached to every exported service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub service_version: String,
    pub environment: String,
}

/// Groups the batch into one `ResourceSpans` per service.
pub fn encode_request(batch: &[SpanRecord], resource: &ResourceInfo) -> ExportTraceServiceRequest {
    let mut by_service: BTreeMap<&str, Vec<OtlpSpan>> = BTreeMap::new();
    for record in batch {
        by_service
            .entry(record.service.as_str())
            .or_default()
            .push(encode_span(record));
    }

    let resource_spans = by_service
        .into_iter()
        .map(|(service, spans)| ResourceSpans {
            resource: Some(Resource {
                attributes: vec![
                    string_kv("service.name", service),
                    string_kv("service.version", &resource.service_version),
                    string_kv("deployment.environment", &resource.environment),
                ],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: SCOPE_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                }),
                spans,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        })
        .collect();

    ExportTraceServiceRequest { resource_spans }
}

pub fn encode_span(record: &SpanRecord) -> OtlpSpan {
    let end = unix_nanos(record.end_ts);
    let events = record
        .error
        .iter()
        .map(|message| Event {
            time_unix_nano: end,
            name: "exception".to_string(),
            attributes: vec![string_kv("exception.message", message)],
            ..Default::default()
        })
        .collect();

    let code = match record.status {
        SpanStatus::Unset => StatusCode::Unset,
        SpanStatus::Error => StatusCode::Error,
    };

    OtlpSpan {
        trace_id: record.trace_id.to_bytes().to_vec(),
        span_id: record.span_id.to_bytes().to_vec(),
        parent_span_id: record
            .parent_span_id
            .map(|id| id.to_bytes().to_vec())
            .unwrap_or_default(),
        name: record.name.clone(),
        kind: span_kind(record.kind) as i32,
        start_time_unix_nano: unix_nanos(record.start_ts),
        end_time_unix_nano: end,
        attributes: record
            .attributes
            .iter()
            .map(|(key, value)| attr_kv(key, value))
            .collect(),
        events,
        status: Some(Status {
            message: record.error.clone().unwrap_or_default(),
            code: code as i32,
        }),
        ..Default::default()
    }
}

fn span_kind(kind: SpanKind) -> OtlpSpanKind {
    match kind {
        SpanKind::Server => OtlpSpanKind::Server,
        SpanKind::Client => OtlpSpanKind::Client,
        SpanKind::Internal => OtlpSpanKind::Internal,
    }
}

fn unix_nanos(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_nanos_opt().unwrap_or_default().max(0) as u64
}

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(Value::StringValue(value.to_string())),
        }),
    }
}

fn attr_kv(key: &str, value: &AttrValue) -> KeyValue {
    let value = match value {
        AttrValue::Bool(b) => Value::BoolValue(*b),
        AttrValue::Int(i) => Value::IntValue(*i),
        AttrValue::Str(s) => Value::StringValue(s.clone()),
    };
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue { value: Some(value) }),
    }
}
