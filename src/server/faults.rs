use std::sync::Arc;

use crate::common::data::PathPolicy;

/// Source of uniformly distributed values in `[0, 1)`.
pub trait RandomSource {
    fn next_unit(&self) -> f64;
}

/// Draws from the thread-local generator of the `rand` crate.
#[derive(Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Decides per request whether a simulated failure is injected.
pub struct FaultInjector {
    random: Arc<dyn RandomSource + Send + Sync>,
}

impl FaultInjector {
    pub fn new(random: Arc<dyn RandomSource + Send + Sync>) -> Self {
        Self { random }
    }

    /// True with a probability of roughly `errorRate` percent. Rates at or below zero never
    /// draw from the random source.
    pub fn should_fail(&self, policy: &PathPolicy) -> bool {
        let rate = policy.error_rate();
        if rate.is_nan() || rate <= 0.0 {
            return false;
        }

        rate > self.random.next_unit() * 100.0
    }
}
