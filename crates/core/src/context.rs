//! W3C trace context: the identifier pair that crosses process boundaries.
//!
//! Only the `traceparent` value is modelled. A hop that receives a context
//! keeps the trace id and flags and mints a new span id for every span it
//! opens underneath.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PaytraceError, Result};
use crate::ids::{SpanId, TraceId, is_lower_hex};
use crate::random::RandomSource;

pub const TRACEPARENT_HEADER: &str = "traceparent";

const SUPPORTED_VERSION: u8 = 0x00;
const INVALID_VERSION: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const SAMPLED: Self = Self(0x01);
    pub const NONE: Self = Self(0x00);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
}

impl TraceContext {
    pub fn new(trace_id: TraceId, span_id: SpanId, flags: TraceFlags) -> Self {
        Self {
            trace_id,
            span_id,
            flags,
        }
    }

    /// Fresh trace, sampled.
    pub fn new_root(random: &dyn RandomSource) -> Self {
        Self::new(
            TraceId::generate(random),
            SpanId::generate(random),
            TraceFlags::SAMPLED,
        )
    }

    /// Same trace and flags, new span id.
    pub fn child(&self, random: &dyn RandomSource) -> Self {
        Self::new(self.trace_id, SpanId::generate(random), self.flags)
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    pub fn to_traceparent(&self) -> String {
        format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            self.trace_id,
            self.span_id,
            self.flags.bits()
        )
    }

    pub fn from_traceparent(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.trim().split('-').collect();
        if parts.len() < 4 {
            return Err(PaytraceError::Parse(format!(
                "traceparent needs 4 fields: {input}"
            )));
        }

        let version = parse_hex_byte(parts[0], "version")?;
        if version == INVALID_VERSION {
            return Err(PaytraceError::Parse("traceparent version ff is invalid".to_string()));
        }
        if version == SUPPORTED_VERSION && parts.len() != 4 {
            return Err(PaytraceError::Parse(format!(
                "traceparent version 00 takes exactly 4 fields: {input}"
            )));
        }

        let trace_id = TraceId::parse(parts[1])?;
        let span_id = SpanId::parse(parts[2])?;
        let flags = TraceFlags(parse_hex_byte(parts[3], "flags")?);
        Ok(Self::new(trace_id, span_id, flags))
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_traceparent())
    }
}

fn parse_hex_byte(input: &str, field: &str) -> Result<u8> {
    if input.len() != 2 || !is_lower_hex(input) {
        return Err(PaytraceError::Parse(format!(
            "invalid traceparent {field}: {input}"
        )));
    }
    u8::from_str_radix(input, 16)
        .map_err(|e| PaytraceError::Parse(format!("invalid traceparent {field} {input}: {e}")))
}
