use std::time::Duration;

use rand::Rng;

/// Shared retry/backoff configuration for service-bound HTTP operations.
#[derive(Clone, Debug)]
pub struct RetryPlan {
    pub max_attempts: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl RetryPlan {
    pub fn new(max_attempts: u32, base: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base,
            max_delay,
        }
    }

    pub fn default_plan() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }

    /// `base * 2^min(6, attempt-1) * U[0.85, 1.15]`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        let scaled = self.base.mul_f64(2f64.powi(exponent as i32));
        let jitter = rng.gen_range(0.85..=1.15);
        scaled.mul_f64(jitter).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn first_attempt_uses_base_with_jitter() {
        let plan = RetryPlan::default_plan();
        let mut rng = StdRng::seed_from_u64(1);
        let delay = plan.delay_for_attempt(1, &mut rng);
        assert!(delay >= Duration::from_millis(170) && delay <= Duration::from_millis(230));
    }

    #[test]
    fn delay_caps_at_max_delay() {
        let plan = RetryPlan::default_plan();
        let mut rng = StdRng::seed_from_u64(2);
        let delay = plan.delay_for_attempt(50, &mut rng);
        assert!(delay <= Duration::from_secs(30));
    }

    #[test]
    fn exponent_clamps_at_six() {
        let plan = RetryPlan::new(10, Duration::from_millis(200), Duration::from_secs(300));
        let mut rng = StdRng::seed_from_u64(3);
        let at_six = plan.delay_for_attempt(7, &mut rng);
        let at_ten = plan.delay_for_attempt(11, &mut rng);
        assert!(at_six <= Duration::from_millis(200 * 64 * 2));
        assert!(at_ten <= Duration::from_millis(200 * 64 * 2));
    }
}
