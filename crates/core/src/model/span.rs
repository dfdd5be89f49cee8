use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SpanId, TraceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Unset,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Server,
    Client,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A closed span, as handed to the export sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub service: String,
    pub name: String,
    pub kind: SpanKind,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub status: SpanStatus,
    pub error: Option<String>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl SpanRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.end_ts - self.start_ts).num_milliseconds().max(0)
    }

    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn duration_never_negative() {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 1).unwrap();
        let record = SpanRecord {
            trace_id: TraceId::parse("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            span_id: SpanId::parse("00f067aa0ba902b7").unwrap(),
            parent_span_id: None,
            service: "payments".into(),
            name: "save-payment".into(),
            kind: SpanKind::Internal,
            start_ts: start,
            end_ts: start - chrono::Duration::milliseconds(5),
            status: SpanStatus::Unset,
            error: None,
            attributes: BTreeMap::new(),
        };
        assert_eq!(record.duration_ms(), 0);
        assert!(!record.is_error());
    }

    #[test]
    fn attributes_serialize_untagged() {
        let mut attrs = BTreeMap::new();
        attrs.insert("approved".to_string(), AttrValue::from(true));
        attrs.insert("payment.id".to_string(), AttrValue::from(42_i64));
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"approved":true,"payment.id":42}"#);
    }
}
