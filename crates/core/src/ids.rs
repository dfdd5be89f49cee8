use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PaytraceError, Result};
use crate::random::RandomSource;

/// Only `0-9a-f`; traceparent fields are lowercase on the wire.
pub(crate) fn is_lower_hex(input: &str) -> bool {
    input.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// 128-bit trace identifier, rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

/// 64-bit span identifier, rendered as 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl TraceId {
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() != 32 || !is_lower_hex(input) {
            return Err(PaytraceError::Parse(format!("invalid trace id: {input}")));
        }
        let value = u128::from_str_radix(input, 16)
            .map_err(|e| PaytraceError::Parse(format!("invalid trace id {input}: {e}")))?;
        if value == 0 {
            return Err(PaytraceError::Parse("trace id must not be all zeros".to_string()));
        }
        Ok(Self(value))
    }

    pub fn generate(random: &dyn RandomSource) -> Self {
        loop {
            let value = ((random.next_u64() as u128) << 64) | random.next_u64() as u128;
            if value != 0 {
                return Self(value);
            }
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl SpanId {
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() != 16 || !is_lower_hex(input) {
            return Err(PaytraceError::Parse(format!("invalid span id: {input}")));
        }
        let value = u64::from_str_radix(input, 16)
            .map_err(|e| PaytraceError::Parse(format!("invalid span id {input}: {e}")))?;
        if value == 0 {
            return Err(PaytraceError::Parse("span id must not be all zeros".to_string()));
        }
        Ok(Self(value))
    }

    pub fn generate(random: &dyn RandomSource) -> Self {
        loop {
            let value = random.next_u64();
            if value != 0 {
                return Self(value);
            }
        }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
