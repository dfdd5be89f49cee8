pub mod payment;
pub mod span;
