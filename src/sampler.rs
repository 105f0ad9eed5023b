//! Metrics sampling loop.
//!
//! Runs at the display refresh rate under normal scheduling. Raw sources
//! are only re-read every `sample_divider`-th cycle (the kernel counters
//! don't update faster anyway); filtering, the signal pipeline and the
//! frame encoder run every cycle on the cached raw values, and the result
//! is published to the shared duty-cycle slot in a single assignment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::filter::LowPass;
use crate::frame::{DutyCycleSet, DutySlot};
use crate::level::LevelRegion;
use crate::metrics::{CpuLoad, TempSensor, ram_used_pct};
use crate::pipeline::SignalPipeline;

// Time constant of the metric low-pass filters. Bigger values further
// smooth (and slow down) the displayed response.
const FILTER_TAU: f32 = 0.5;

/// Sampler parameters, fixed for the lifetime of the service.
pub struct SamplerConfig {
    pub refresh_hz: f32,
    pub sample_divider: u32,
    pub pwm_res: u8,
    pub gamma: f32,
    pub brightness: f32,
}

/// Run the sampling loop until `stop` is raised.
pub fn run(cfg: &SamplerConfig, slot: &DutySlot, level: &LevelRegion, stop: &AtomicBool) {
    let pipeline = SignalPipeline::new(cfg.gamma, cfg.brightness);

    let mut cpu_filter = LowPass::new(FILTER_TAU, cfg.refresh_hz);
    let mut ram_filter = LowPass::new(FILTER_TAU, cfg.refresh_hz);
    let mut temp_filter = LowPass::new(FILTER_TAU, cfg.refresh_hz);

    let mut cpu_source = CpuLoad::new();
    let mut temp_source = TempSensor::new();

    let mut cpu_cache = 0.0;
    let mut ram_cache = 0.0;
    let mut temp_cache = 0.0;
    // Start saturated so the first cycle samples immediately.
    let mut div_counter = cfg.sample_divider;

    let period = Duration::from_secs_f32(1.0 / cfg.refresh_hz);
    let mut next_refresh = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        if div_counter >= cfg.sample_divider {
            div_counter = 0;

            // A failed read keeps the previous cached value; a missing
            // temperature sensor displays as a dark bar.
            match cpu_source.sample() {
                Ok(load) => cpu_cache = load,
                Err(e) => warn!(error = %e, "CPU load sample failed"),
            }
            match ram_used_pct() {
                Ok(used) => ram_cache = used,
                Err(e) => warn!(error = %e, "RAM usage sample failed"),
            }
            temp_cache = temp_source.sample().unwrap_or(0.0);

            debug!(cpu = cpu_cache, ram = ram_cache, temp = temp_cache, "raw samples");
        }
        div_counter += 1;

        let cpu = cpu_filter.update(cpu_cache);
        let ram = ram_filter.update(ram_cache);
        let temp = temp_filter.update(temp_cache);
        let user = level.read();

        let brightness = pipeline.compute_brightness(cpu, ram, temp, user);
        slot.publish(DutyCycleSet::encode(&brightness, cfg.pwm_res));

        next_refresh += period;
        let now = Instant::now();
        if next_refresh < now {
            // Running late (system load, or the realtime clock jumped at
            // boot): re-anchor instead of fast-forwarding through backlog.
            next_refresh = now + period;
        }
        thread::sleep(next_refresh.saturating_duration_since(now));
    }
}
