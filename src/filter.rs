//! Single-pole exponential low-pass filter for metric smoothing.
//!
//! Raw system counters are noisy and update at coarse intervals, so every
//! metric is pushed through one of these filters at the sampler's refresh
//! rate before it reaches the display pipeline. The filter only behaves as
//! designed when updated at the rate it was constructed for.

/// A float value with a built-in low-pass filter.
///
/// The smoothing coefficient is derived from a time constant `tau` (seconds)
/// and the update frequency: `alpha = 1 - exp(-1 / (sample_rate_hz * tau))`.
/// A `tau` of zero degenerates to `alpha = 1`, i.e. no smoothing at all.
#[derive(Debug, Clone, Copy)]
pub struct LowPass {
    value: f32,
    alpha: f32,
}

impl LowPass {
    /// Create a filter for samples arriving at `sample_rate_hz`, smoothed
    /// over roughly `tau` seconds, starting from zero.
    pub fn new(tau: f32, sample_rate_hz: f32) -> Self {
        debug_assert!(tau >= 0.0);
        debug_assert!(sample_rate_hz > 0.0);
        // tau == 0 makes the exponent -inf, so alpha lands on exactly 1.0.
        let alpha = 1.0 - (-1.0 / (sample_rate_hz * tau)).exp();
        Self { value: 0.0, alpha }
    }

    /// Feed one sample and return the new smoothed value.
    pub fn update(&mut self, sample: f32) -> f32 {
        self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        self.value
    }

    /// Current smoothed value.
    pub fn value(&self) -> f32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_alpha_in_unit_interval() {
        let filter = LowPass::new(0.5, 10.0);
        assert!(filter.alpha > 0.0 && filter.alpha <= 1.0);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut filter = LowPass::new(0.5, 10.0);
        for _ in 0..1000 {
            filter.update(42.0);
        }
        assert_relative_eq!(filter.value(), 42.0, epsilon = 1e-3);
    }

    #[test]
    fn test_zero_tau_snaps_immediately() {
        let mut filter = LowPass::new(0.0, 10.0);
        assert_relative_eq!(filter.update(7.5), 7.5);
    }

    #[test]
    fn test_single_update_moves_partially() {
        let mut filter = LowPass::new(0.5, 10.0);
        let after_one = filter.update(100.0);
        assert!(after_one > 0.0 && after_one < 100.0);
    }
}
