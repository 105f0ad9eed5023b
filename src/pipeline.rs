//! Metric-to-brightness signal pipeline.
//!
//! Converts the four filtered metrics (CPU load, RAM usage, temperature and
//! the externally supplied user level) into per-channel brightness targets
//! for the 16-channel bar-graph display. Each bar is a "thermometer": fixed
//! bands of the metric's range drive consecutive channels, with at most one
//! partially-lit channel at the top of the bar.

/// Number of LED driver channels.
pub const NUM_CHANNELS: usize = 16;

// Positions of each bar segment in the LED driver register, ordered from
// the least significant band to the most significant one. The wiring of the
// board dictates these, not the code.
const CPU_CHANNELS: [usize; 5] = [4, 3, 2, 1, 0];
const RAM_CHANNELS: [usize; 5] = [9, 8, 7, 6, 5];
const TEMP_CHANNELS: [usize; 5] = [11, 10, 12, 13, 14];
const USER_CHANNEL: usize = 15;

const CPU_BAND: f32 = 20.0;
const RAM_BAND: f32 = 20.0;
const TEMP_BAND: f32 = 10.0;

// The temperature bar only starts moving above this floor; everything below
// is displayed as fully dark.
const TEMP_FLOOR: f32 = 40.0;

// Depending on LED make and model, some colors appear brighter than others.
// These factors equalize the perceived intensity per color.
const LED_GREEN: f32 = 1.0;
const LED_YELLOW: f32 = 1.0;
const LED_RED: f32 = 1.0;
const LED_USER: f32 = 1.0;

#[rustfmt::skip]
const CHANNEL_MULTIPLIERS: [f32; NUM_CHANNELS] = [
    LED_YELLOW, LED_GREEN, LED_GREEN, LED_GREEN, LED_GREEN,
    LED_RED, LED_YELLOW, LED_GREEN, LED_GREEN, LED_GREEN,
    LED_GREEN, LED_GREEN, LED_YELLOW, LED_RED, LED_RED,
    LED_USER,
];

// Below this the exponential response curve is numerically degenerate and
// identical to the identity mapping.
const GAMMA_EPSILON: f32 = 1e-6;

/// Computes per-channel brightness from metric values.
pub struct SignalPipeline {
    gamma: f32,
    multipliers: [f32; NUM_CHANNELS],
}

impl SignalPipeline {
    /// Build a pipeline with the given response curve exponent and a global
    /// brightness scale applied uniformly to every channel multiplier.
    pub fn new(gamma: f32, global_scale: f32) -> Self {
        Self {
            gamma,
            multipliers: CHANNEL_MULTIPLIERS.map(|m| m * global_scale),
        }
    }

    /// Map the four metric values onto 16 channel brightness targets in [0, 1].
    ///
    /// `cpu` and `ram` are percentages, `temp` is in degrees Celsius and
    /// `user` is already normalized to [0, 1]. Values beyond each bar's range
    /// saturate; they never overflow into other channels.
    pub fn compute_brightness(&self, cpu: f32, ram: f32, temp: f32, user: f32) -> [f32; NUM_CHANNELS] {
        let mut out = [0.0; NUM_CHANNELS];

        self.fill_bar(&mut out, &CPU_CHANNELS, cpu, CPU_BAND, 0.0);
        self.fill_bar(&mut out, &RAM_CHANNELS, ram, RAM_BAND, 0.0);
        self.fill_bar(&mut out, &TEMP_CHANNELS, temp, TEMP_BAND, TEMP_FLOOR);
        out[USER_CHANNEL] = self.linearize(user);

        for (value, mult) in out.iter_mut().zip(self.multipliers) {
            *value = (*value * mult).clamp(0.0, 1.0);
        }
        out
    }

    /// Compensate the LEDs' nonlinear perceived brightness so that duty
    /// cycle maps to visually linear intensity:
    /// `(exp(gamma * x) - 1) / (exp(gamma) - 1)`, with `x` clamped to [0, 1].
    ///
    /// Not the proper photometric linearization, but close enough.
    pub fn linearize(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        if self.gamma < GAMMA_EPSILON {
            return x;
        }
        ((self.gamma * x).exp() - 1.0) / (self.gamma.exp() - 1.0)
    }

    /// Light up one thermometer bar. Channels below the active band go fully
    /// on, the active band's channel gets a partial level, everything above
    /// stays dark.
    fn fill_bar(
        &self,
        out: &mut [f32; NUM_CHANNELS],
        channels: &[usize; 5],
        value: f32,
        band: f32,
        floor: f32,
    ) {
        for (i, &ch) in channels.iter().enumerate() {
            if value >= floor + band * (i as f32 + 1.0) {
                out[ch] = 1.0;
            } else {
                out[ch] = self.linearize((value - floor - band * i as f32) / band);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cpu_group(out: &[f32; NUM_CHANNELS]) -> [f32; 5] {
        CPU_CHANNELS.map(|ch| out[ch])
    }

    #[test]
    fn test_linearize_endpoints() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        assert_relative_eq!(pipeline.linearize(0.0), 0.0);
        assert_relative_eq!(pipeline.linearize(1.0), 1.0);
    }

    #[test]
    fn test_linearize_monotone() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        let mut prev = 0.0;
        for step in 0..=100 {
            let y = pipeline.linearize(step as f32 / 100.0);
            assert!(y >= prev);
            prev = y;
        }
    }

    #[test]
    fn test_linearize_clamps_input() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        assert_relative_eq!(pipeline.linearize(-3.0), 0.0);
        assert_relative_eq!(pipeline.linearize(4.0), 1.0);
    }

    #[test]
    fn test_cpu_bar_partial_band() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        let out = pipeline.compute_brightness(45.0, 0.0, 0.0, 0.0);
        let bar = cpu_group(&out);
        assert_relative_eq!(bar[0], 1.0);
        assert_relative_eq!(bar[1], 1.0);
        assert_relative_eq!(bar[2], pipeline.linearize(5.0 / 20.0));
        assert_relative_eq!(bar[3], 0.0);
        assert_relative_eq!(bar[4], 0.0);
    }

    #[test]
    fn test_thermometer_monotonicity() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        for pct in 0..=120 {
            let out = pipeline.compute_brightness(pct as f32, 0.0, 0.0, 0.0);
            let bar = cpu_group(&out);
            for i in 1..5 {
                // A lit channel never sits above a darker one.
                assert!(bar[i] <= bar[i - 1]);
            }
        }
    }

    #[test]
    fn test_cpu_over_100_saturates() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        let out = pipeline.compute_brightness(250.0, 0.0, 0.0, 0.0);
        for level in cpu_group(&out) {
            assert_relative_eq!(level, 1.0);
        }
    }

    #[test]
    fn test_temperature_dark_below_floor() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        let out = pipeline.compute_brightness(0.0, 0.0, 40.0, 0.0);
        for ch in TEMP_CHANNELS {
            assert_relative_eq!(out[ch], 0.0);
        }
    }

    #[test]
    fn test_temperature_bands_above_floor() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        let out = pipeline.compute_brightness(0.0, 0.0, 65.0, 0.0);
        assert_relative_eq!(out[TEMP_CHANNELS[0]], 1.0);
        assert_relative_eq!(out[TEMP_CHANNELS[1]], 1.0);
        assert_relative_eq!(out[TEMP_CHANNELS[2]], pipeline.linearize(0.5));
        assert_relative_eq!(out[TEMP_CHANNELS[3]], 0.0);
        assert_relative_eq!(out[TEMP_CHANNELS[4]], 0.0);
    }

    #[test]
    fn test_user_channel_direct() {
        let pipeline = SignalPipeline::new(2.8, 1.0);
        let out = pipeline.compute_brightness(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(out[USER_CHANNEL], 1.0);
    }

    #[test]
    fn test_degenerate_gamma_cpu_at_60() {
        // With gamma ~ 0 the response curve is the identity, which makes the
        // expected bar pattern exact: 60 >= 20 * 3, so three full channels.
        let pipeline = SignalPipeline::new(0.0, 1.0);
        let out = pipeline.compute_brightness(60.0, 0.0, 0.0, 0.0);
        let bar = cpu_group(&out);
        assert_relative_eq!(bar[0], 1.0);
        assert_relative_eq!(bar[1], 1.0);
        assert_relative_eq!(bar[2], 1.0);
        assert_relative_eq!(bar[3], 0.0);
        assert_relative_eq!(bar[4], 0.0);
    }

    #[test]
    fn test_global_scale_dims_everything() {
        let pipeline = SignalPipeline::new(0.0, 0.5);
        let out = pipeline.compute_brightness(100.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(out[CPU_CHANNELS[0]], 0.5);
        assert_relative_eq!(out[USER_CHANNEL], 0.5);
    }
}
