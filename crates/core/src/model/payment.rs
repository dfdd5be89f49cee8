//! Request-scoped records that flow through the hop chain.
//!
//! None of these are stored anywhere; the "save" steps only simulate latency.

use serde::{Deserialize, Serialize};

use crate::random::RandomSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub card_id: String,
    pub amount: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment_id: u64,
}

impl PaymentRecord {
    /// Non-negative 63-bit id; collisions are not checked.
    pub fn generate(random: &dyn RandomSource) -> Self {
        Self {
            payment_id: random.next_u64() & (i64::MAX as u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: String,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.payment_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudVerdict {
    pub card_id: String,
    pub amount: String,
    pub approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub card_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheckRequest {
    pub card_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheckResponse {
    pub status: String,
}

impl StatusCheckResponse {
    pub const ACTIVE: &'static str = "active";

    pub fn active() -> Self {
        Self {
            status: Self::ACTIVE.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == Self::ACTIVE
    }
}
