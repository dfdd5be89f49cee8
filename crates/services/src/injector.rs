//! Randomized latency and failure for the simulated "save" and "score" steps.

use std::sync::Arc;
use std::time::Duration;

use paytrace_core::random::RandomSource;
use paytrace_trace::Span;

use crate::error::HopError;

/// Bounds of one simulated step, in delay units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkProfile {
    /// Exclusive upper bound of the drawn delay.
    pub delay_bound: u64,
    /// The step fails when the drawn delay is strictly greater than this.
    pub failure_threshold: u64,
}

impl WorkProfile {
    pub const SAVE: Self = Self {
        delay_bound: 5,
        failure_threshold: 2,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkOutcome {
    pub units: u64,
    pub elapsed: Duration,
    pub ok: bool,
}

#[derive(Clone)]
pub struct Injector {
    random: Arc<dyn RandomSource>,
    unit: Duration,
}

impl Injector {
    pub fn new(random: Arc<dyn RandomSource>, unit: Duration) -> Self {
        Self { random, unit }
    }

    pub fn random(&self) -> &dyn RandomSource {
        self.random.as_ref()
    }

    /// Draws a delay and its verdict without sleeping.
    pub fn draw(&self, profile: WorkProfile) -> WorkOutcome {
        let units = self.random.below(profile.delay_bound);
        let factor = u32::try_from(units).unwrap_or(u32::MAX);
        WorkOutcome {
            units,
            elapsed: self.unit.saturating_mul(factor),
            ok: units <= profile.failure_threshold,
        }
    }

    /// Suspends the calling task for the drawn delay, then reports the verdict.
    pub async fn simulate_work(&self, profile: WorkProfile) -> WorkOutcome {
        let outcome = self.draw(profile);
        tokio::time::sleep(outcome.elapsed).await;
        outcome
    }

    pub async fn fixed_delay(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    pub fn coin(&self) -> bool {
        self.random.below(2) == 1
    }

    /// Runs a simulated persistence step under `span`, failing it with
    /// `failure` when the draw exceeds the threshold.
    pub async fn save(
        &self,
        span: &mut Span,
        profile: WorkProfile,
        failure: &str,
    ) -> Result<(), HopError> {
        let outcome = self.simulate_work(profile).await;
        span.set_attribute("simulated.delay_units", outcome.units as i64);
        if outcome.ok {
            return Ok(());
        }
        let err = HopError::SimulatedSaveFailure(failure.to_string());
        span.record_error(&err);
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use paytrace_core::random::SeededRandom;
    use testkit::ScriptedRandom;

    use super::*;

    #[test]
    fn fails_only_above_threshold() {
        let injector = Injector::new(
            ScriptedRandom::shared([0, 1, 2, 3, 4]),
            Duration::from_secs(1),
        );
        let verdicts: Vec<bool> = (0..5)
            .map(|_| injector.draw(WorkProfile::SAVE).ok)
            .collect();
        assert_eq!(verdicts, vec![true, true, true, false, false]);
    }

    #[test]
    fn elapsed_scales_with_unit() {
        let injector = Injector::new(ScriptedRandom::shared([4]), Duration::from_millis(250));
        let outcome = injector.draw(WorkProfile::SAVE);
        assert_eq!(outcome.units, 4);
        assert_eq!(outcome.elapsed, Duration::from_secs(1));
        assert!(!outcome.ok);
    }

    #[test]
    fn seeded_injectors_agree() {
        let a = Injector::new(Arc::new(SeededRandom::new(17)), Duration::from_secs(1));
        let b = Injector::new(Arc::new(SeededRandom::new(17)), Duration::from_secs(1));
        for _ in 0..16 {
            assert_eq!(a.draw(WorkProfile::SAVE), b.draw(WorkProfile::SAVE));
        }
    }

    #[test]
    fn draws_stay_below_bound() {
        let injector = Injector::new(Arc::new(SeededRandom::new(5)), Duration::from_secs(1));
        for _ in 0..64 {
            assert!(injector.draw(WorkProfile::SAVE).units < WorkProfile::SAVE.delay_bound);
        }
    }

    #[test]
    fn coin_is_draw_of_one() {
        let injector = Injector::new(ScriptedRandom::shared([1, 0]), Duration::from_secs(1));
        assert!(injector.coin());
        assert!(!injector.coin());
    }

    #[tokio::test]
    async fn simulate_work_sleeps_for_drawn_delay() {
        let injector = Injector::new(ScriptedRandom::shared([3]), Duration::from_millis(10));
        let started = tokio::time::Instant::now();
        let outcome = injector.simulate_work(WorkProfile::SAVE).await;
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!outcome.ok);
    }

    #[tokio::test]
    async fn save_marks_span_on_failure() {
        let (sink, exporter) = testkit::memory_sink();
        let tracer = paytrace_trace::Tracer::new(
            "payments",
            sink.clone(),
            ScriptedRandom::shared([]),
        );
        let injector = Injector::new(ScriptedRandom::shared([4]), Duration::from_millis(1));

        let entry = tracer.start_entry("entry", None);
        let mut span = entry.child("save-payment");
        let result = injector.save(&mut span, WorkProfile::SAVE, "save timeout").await;
        assert!(matches!(result, Err(HopError::SimulatedSaveFailure(_))));
        drop(span);
        drop(entry);
        sink.flush().await;

        let save = exporter
            .spans()
            .into_iter()
            .find(|s| s.name == "save-payment")
            .unwrap();
        assert!(save.is_error());
        assert_eq!(save.error.as_deref(), Some("save timeout"));
    }
}
