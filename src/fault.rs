use std::sync::Arc;

use crate::random::RandomSource;

/// Decides whether a webhook callback should answer with a synthetic 503.
///
/// Only the `/customer-webhook` echo path consults this. Admission counting
/// and event ingestion never depend on it.
#[derive(Clone)]
pub struct FaultInjector {
    failure_percent: u8,
    source: Arc<dyn RandomSource>,
}

impl FaultInjector {
    pub fn new(failure_percent: u8, source: Arc<dyn RandomSource>) -> Self {
        Self {
            failure_percent: failure_percent.min(100),
            source,
        }
    }

    pub fn failure_percent(&self) -> u8 {
        self.failure_percent
    }

    pub fn should_fail(&self) -> bool {
        should_fail(self.failure_percent, self.source.as_ref())
    }
}

// every call takes a fresh draw, nothing carries over between requests
pub fn should_fail(failure_percent: u8, source: &dyn RandomSource) -> bool {
    source.percent() < f64::from(failure_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{SeededRandom, ThreadRandom};

    const TRIALS: usize = 10_000;

    fn failures(injector: &FaultInjector) -> usize {
        (0..TRIALS).filter(|_| injector.should_fail()).count()
    }

    #[test]
    fn zero_percent_never_fails() {
        let injector = FaultInjector::new(0, Arc::new(ThreadRandom));
        assert_eq!(failures(&injector), 0);
    }

    #[test]
    fn hundred_percent_always_fails() {
        let injector = FaultInjector::new(100, Arc::new(ThreadRandom));
        assert_eq!(failures(&injector), TRIALS);
    }

    #[test]
    fn thirty_percent_within_two_points() {
        for injector in [
            FaultInjector::new(30, Arc::new(ThreadRandom)),
            FaultInjector::new(30, Arc::new(SeededRandom::new(1234))),
        ] {
            let rate = failures(&injector) as f64 / TRIALS as f64;
            assert!((0.28..=0.32).contains(&rate), "observed rate {rate}");
        }
    }

    #[test]
    fn percent_is_clamped() {
        let injector = FaultInjector::new(250, Arc::new(ThreadRandom));
        assert_eq!(injector.failure_percent(), 100);
    }
}
