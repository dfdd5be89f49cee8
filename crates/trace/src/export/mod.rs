//! Span exporters: where the sink delivers finished spans.

pub mod encode;
pub mod log;
pub mod memory;
pub mod otlp;

use futures::future::BoxFuture;
use paytrace_core::model::span::SpanRecord;

/// Best-effort delivery of a batch; failures are logged, never returned.
pub trait SpanExporter: Send + Sync + 'static {
    fn export(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, ()>;
}
