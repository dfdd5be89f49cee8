use futures::future::BoxFuture;
use paytrace_core::model::span::SpanRecord;

use crate::export::SpanExporter;

/// Writes one structured log line per finished span.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    fn export(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            for span in &batch {
                let parent = span
                    .parent_span_id
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                if let Some(error) = &span.error {
                    tracing::warn!(
                        target: "paytrace::span",
                        service = %span.service,
                        trace_id = %span.trace_id,
                        span_id = %span.span_id,
                        parent_span_id = %parent,
                        duration_ms = span.duration_ms(),
                        error = %error,
                        "{}",
                        span.name
                    );
                } else {
                    tracing::info!(
                        target: "paytrace::span",
                        service = %span.service,
                        trace_id = %span.trace_id,
                        span_id = %span.span_id,
                        parent_span_id = %parent,
                        duration_ms = span.duration_ms(),
                        "{}",
                        span.name
                    );
                }
            }
        })
    }
}
