//! Span guards with explicit context passing.
//!
//! A [`Span`] is closed when it is dropped, so every exit path of the code that
//! owns it (early `?` return, panic unwinding, a timed-out future being
//! dropped) closes it exactly once. Children are derived from a parent span
//! value, never from ambient state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use paytrace_core::TraceContext;
use paytrace_core::ids::SpanId;
use paytrace_core::model::span::{AttrValue, SpanKind, SpanRecord, SpanStatus};
use paytrace_core::random::RandomSource;

use crate::sink::SpanSink;

/// Per-service span factory.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    service: String,
    sink: SpanSink,
    random: Arc<dyn RandomSource>,
}

impl Tracer {
    pub fn new(service: impl Into<String>, sink: SpanSink, random: Arc<dyn RandomSource>) -> Self {
        Self {
            inner: Arc::new(TracerInner {
                service: service.into(),
                sink,
                random,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// Opens the server span for an inbound request, continuing `parent` when
    /// the caller propagated one and starting a new trace otherwise.
    pub fn start_entry(&self, name: impl Into<String>, parent: Option<&TraceContext>) -> Span {
        let random = self.inner.random.as_ref();
        let (context, parent_span_id) = match parent {
            Some(parent) => (parent.child(random), Some(parent.span_id())),
            None => (TraceContext::new_root(random), None),
        };
        Span::open(self.clone(), name.into(), SpanKind::Server, context, parent_span_id)
    }
}

pub struct Span {
    tracer: Tracer,
    context: TraceContext,
    parent_span_id: Option<SpanId>,
    name: String,
    kind: SpanKind,
    start_ts: DateTime<Utc>,
    status: SpanStatus,
    error: Option<String>,
    attributes: BTreeMap<String, AttrValue>,
    ended: bool,
}

impl Span {
    fn open(
        tracer: Tracer,
        name: String,
        kind: SpanKind,
        context: TraceContext,
        parent_span_id: Option<SpanId>,
    ) -> Self {
        Self {
            tracer,
            context,
            parent_span_id,
            name,
            kind,
            start_ts: Utc::now(),
            status: SpanStatus::Unset,
            error: None,
            attributes: BTreeMap::new(),
            ended: false,
        }
    }

    /// Context to hand to nested work or to inject into an outbound call.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child(&self, name: impl Into<String>) -> Span {
        self.nested(name.into(), SpanKind::Internal)
    }

    /// Child span wrapping an outbound call to another hop.
    pub fn client_child(&self, name: impl Into<String>) -> Span {
        self.nested(name.into(), SpanKind::Client)
    }

    fn nested(&self, name: String, kind: SpanKind) -> Span {
        let context = self.context.child(self.tracer.inner.random.as_ref());
        Span::open(
            self.tracer.clone(),
            name,
            kind,
            context,
            Some(self.context.span_id()),
        )
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn record_error(&mut self, err: &dyn std::error::Error) {
        self.fail(err.to_string());
    }

    /// Marks the span as failed. The latest message wins.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = SpanStatus::Error;
        self.error = Some(message.into());
    }

    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        let record = SpanRecord {
            trace_id: self.context.trace_id(),
            span_id: self.context.span_id(),
            parent_span_id: self.parent_span_id,
            service: self.tracer.inner.service.clone(),
            name: std::mem::take(&mut self.name),
            kind: self.kind,
            start_ts: self.start_ts,
            end_ts: Utc::now(),
            status: self.status,
            error: self.error.take(),
            attributes: std::mem::take(&mut self.attributes),
        };
        self.tracer.inner.sink.submit(record);
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("service", &self.tracer.service())
            .field("name", &self.name)
            .field("context", &self.context)
            .field("status", &self.status)
            .finish()
    }
}
