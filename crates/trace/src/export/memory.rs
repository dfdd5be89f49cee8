use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use paytrace_core::ids::TraceId;
use paytrace_core::model::span::SpanRecord;

use crate::export::SpanExporter;

/// Keeps every exported span in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryExporter {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl MemoryExporter {
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn trace(&self, trace_id: TraceId) -> Vec<SpanRecord> {
        self.spans()
            .into_iter()
            .filter(|s| s.trace_id == trace_id)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for MemoryExporter {
    fn export(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, ()> {
        if let Ok(mut spans) = self.spans.lock() {
            spans.extend(batch);
        }
        Box::pin(async {})
    }
}
