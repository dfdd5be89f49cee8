use std::sync::Arc;
use std::time::Duration;

use paytrace_core::model::span::SpanRecord;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::export::SpanExporter;

/// Hands finished spans to a background exporter task.
///
/// `submit` never waits: when the channel is full the span is dropped.
#[derive(Clone)]
pub struct SpanSink {
    tx: mpsc::Sender<SinkMsg>,
}

pub struct SinkConfig {
    pub channel_capacity: usize,
    pub flush_interval: Duration,
    pub batch_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 2048,
            flush_interval: Duration::from_millis(200),
            batch_size: 512,
        }
    }
}

enum SinkMsg {
    Span(SpanRecord),
    Flush(oneshot::Sender<()>),
}

impl SpanSink {
    /// Must be called from within a tokio runtime.
    pub fn spawn(exporter: Arc<dyn SpanExporter>, cfg: SinkConfig) -> Self {
        let (tx, rx) = mpsc::channel(cfg.channel_capacity.max(1));
        tokio::spawn(run_span_exporter(
            exporter,
            rx,
            cfg.batch_size.max(1),
            cfg.flush_interval,
        ));
        Self { tx }
    }

    pub fn submit(&self, span: SpanRecord) {
        match self.tx.try_send(SinkMsg::Span(span)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("span sink full: dropped span"),
            Err(TrySendError::Closed(_)) => warn!("span sink closed: dropped span"),
        }
    }

    /// Waits until every span submitted before this call has been exported.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SinkMsg::Flush(done_tx)).await.is_err() {
            warn!("span sink closed before flush");
            return;
        }
        let _ = done_rx.await;
    }
}

async fn run_span_exporter(
    exporter: Arc<dyn SpanExporter>,
    mut rx: mpsc::Receiver<SinkMsg>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    let mut buffer = Vec::new();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(SinkMsg::Span(span)) => {
                    buffer.push(span);
                    if buffer.len() >= batch_size {
                        flush_spans(exporter.as_ref(), &mut buffer).await;
                    }
                }
                Some(SinkMsg::Flush(done)) => {
                    flush_spans(exporter.as_ref(), &mut buffer).await;
                    let _ = done.send(());
                }
                // every SpanSink handle is gone
                None => break,
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush_spans(exporter.as_ref(), &mut buffer).await;
                }
            }
        }
    }

    flush_spans(exporter.as_ref(), &mut buffer).await;
}

async fn flush_spans(exporter: &dyn SpanExporter, buffer: &mut Vec<SpanRecord>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    exporter.export(batch).await;
}
