use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use paytrace_core::random::RandomSource;
use paytrace_trace::export::memory::MemoryExporter;
use paytrace_trace::{SinkConfig, SpanSink};

/// Replays a fixed list of `below` draws, then yields zero.
///
/// Draws larger than the requested bound are clamped to `bound - 1`.
/// `next_u64` is a counter, so generated ids are unique and non-zero.
#[derive(Debug, Default)]
pub struct ScriptedRandom {
    draws: Mutex<VecDeque<u64>>,
    counter: AtomicU64,
}

impl ScriptedRandom {
    pub fn new(draws: impl IntoIterator<Item = u64>) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
            counter: AtomicU64::new(0),
        }
    }

    /// Starts the id counter above `base`, keeping ids of separate hops apart.
    pub fn ids_from(self, base: u64) -> Self {
        self.counter.store(base, Ordering::Relaxed);
        self
    }

    pub fn shared(draws: impl IntoIterator<Item = u64>) -> Arc<dyn RandomSource> {
        Arc::new(Self::new(draws))
    }

    pub fn remaining(&self) -> usize {
        self.draws.lock().map(|d| d.len()).unwrap_or_default()
    }
}

impl RandomSource for ScriptedRandom {
    fn next_u64(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn below(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        let next = self
            .draws
            .lock()
            .ok()
            .and_then(|mut draws| draws.pop_front())
            .unwrap_or(0);
        next.min(bound - 1)
    }
}

/// Sink backed by an in-memory exporter. Needs a tokio runtime.
pub fn memory_sink() -> (SpanSink, MemoryExporter) {
    let exporter = MemoryExporter::default();
    let sink = SpanSink::spawn(
        Arc::new(exporter.clone()),
        SinkConfig {
            channel_capacity: 1024,
            flush_interval: Duration::from_millis(10),
            batch_size: 64,
        },
    );
    (sink, exporter)
}

#[cfg(test)]
mod tests {
    use paytrace_core::ids::SpanId;

    use super::*;

    #[test]
    fn scripted_draws_replay_then_default_to_zero() {
        let random = ScriptedRandom::new([4, 1]);
        assert_eq!(random.below(5), 4);
        assert_eq!(random.below(2), 1);
        assert_eq!(random.below(5), 0);
        assert_eq!(random.remaining(), 0);
    }

    #[test]
    fn scripted_draws_clamp_to_bound() {
        let random = ScriptedRandom::new([9]);
        assert_eq!(random.below(2), 1);
    }

    #[test]
    fn scripted_ids_are_unique() {
        let random = ScriptedRandom::new([]);
        let a = SpanId::generate(&random);
        let b = SpanId::generate(&random);
        assert_ne!(a, b);
    }
}
