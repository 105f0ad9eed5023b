//! Real-time PWM playback loop.
//!
//! Plays the published bit-planes back with binary-weighted hold times:
//! plane `i` stays latched for `lsb_period * 2^i`, which turns the digital
//! plane sequence into an apparent analog brightness gradient. The loop
//! runs under SCHED_FIFO where possible, never blocks on the sampler, and
//! always finishes the frame in flight before honoring the stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::frame::{DutyCycleSet, DutySlot};
use crate::gpio::GpioBackend;
use crate::transmitter::ShiftRegister;

// Highest SCHED_FIFO priority; any preemption mid-frame is visible flicker.
const RT_PRIORITY: libc::c_int = 99;

// How long to wait between checks while no complete duty-cycle set has
// been published yet.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Renderer parameters, fixed for the lifetime of the service.
pub struct RenderConfig {
    pub pwm_res: u8,
    /// Hold time of the least significant plane.
    pub lsb_period: Duration,
}

/// Cumulative plane deadlines anchored at loop start.
///
/// Deadlines normally accumulate monotonically; when wall-clock time has
/// already passed a computed deadline (loop delayed by system load, or the
/// clock jumped shortly after boot) the anchor resets to `now + hold`
/// instead of trying to catch up, trading one cycle's brightness accuracy
/// against a burst of back-to-back transmissions.
pub struct PlaneScheduler {
    next: Instant,
}

impl PlaneScheduler {
    pub fn new(anchor: Instant) -> Self {
        Self { next: anchor }
    }

    /// Advance by one plane's hold time and return the deadline to sleep
    /// until.
    pub fn advance(&mut self, hold: Duration, now: Instant) -> Instant {
        self.next += hold;
        if self.next < now {
            self.next = now + hold;
        }
        self.next
    }
}

/// Assign SCHED_FIFO priority to the calling thread.
fn promote_to_realtime() -> std::io::Result<()> {
    let param = libc::sched_param {
        sched_priority: RT_PRIORITY,
    };
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::from_raw_os_error(rc))
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

/// Run the playback loop until `stop` is raised, then drain and tear down.
pub fn run<B: GpioBackend>(gpio: B, cfg: &RenderConfig, slot: &DutySlot, stop: &AtomicBool) {
    match promote_to_realtime() {
        Ok(()) => info!("renderer running at SCHED_FIFO priority {RT_PRIORITY}"),
        Err(e) => warn!(error = %e, "no real-time priority, expect flicker under load"),
    }

    let mut sr = ShiftRegister::new(gpio);
    sr.init();
    sr.send_frame(0);
    sr.commit_frame();
    sr.unblank();

    // Every more significant plane is held twice as long as the previous.
    let holds: Vec<Duration> = (0..cfg.pwm_res)
        .map(|i| cfg.lsb_period * (1u32 << i))
        .collect();

    let mut local = DutyCycleSet::empty();
    let mut scheduler = PlaneScheduler::new(Instant::now());

    while !stop.load(Ordering::Relaxed) {
        // Never block on the sampler: keep the previous snapshot when the
        // slot is contended.
        slot.try_snapshot(&mut local);

        if !local.is_complete(cfg.pwm_res) {
            // Nothing valid published yet.
            thread::sleep(IDLE_POLL);
            continue;
        }

        for (i, &hold) in holds.iter().enumerate() {
            let deadline = scheduler.advance(hold, Instant::now());
            // Playback order is rotated one position against encode order;
            // the cycle never opens on the shortest plane.
            sr.send_frame(local.plane((i + 1) % cfg.pwm_res as usize));
            sleep_until(deadline);
            sr.commit_frame();
        }
    }

    // Drain: leave the register in a defined all-off state before teardown.
    sr.send_frame(0);
    sr.commit_frame();
    sr.blank();
    sr.deinit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::PinRole;
    use crate::gpio::mock::{GpioOp, MockGpio};
    use crate::pipeline::NUM_CHANNELS;
    use std::sync::Arc;

    fn clock_sets(ops: &[GpioOp]) -> usize {
        ops.iter()
            .filter(|op| **op == GpioOp::Set(PinRole::Clock))
            .count()
    }

    fn run_for(cfg: RenderConfig, slot: Arc<DutySlot>, millis: u64) -> Vec<GpioOp> {
        let gpio = MockGpio::new();
        let log = gpio.log();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            thread::spawn(move || run(gpio, &cfg, &slot, &stop))
        };

        thread::sleep(Duration::from_millis(millis));
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        let ops = log.lock().unwrap().clone();
        ops
    }

    #[test]
    fn test_scheduler_accumulates_when_on_time() {
        let t0 = Instant::now();
        let hold = Duration::from_millis(10);
        let mut scheduler = PlaneScheduler::new(t0);

        assert_eq!(scheduler.advance(hold, t0), t0 + hold);
        assert_eq!(scheduler.advance(hold, t0 + Duration::from_millis(5)), t0 + 2 * hold);
    }

    #[test]
    fn test_scheduler_resets_anchor_when_late() {
        let t0 = Instant::now();
        let hold = Duration::from_millis(10);
        let mut scheduler = PlaneScheduler::new(t0);

        // The clock is far past the computed deadline: no catch-up burst,
        // the next deadline is a full hold away from "now".
        let late = t0 + Duration::from_millis(500);
        assert_eq!(scheduler.advance(hold, late), late + hold);
        // And accumulation resumes from the new anchor.
        assert_eq!(scheduler.advance(hold, late), late + 2 * hold);
    }

    #[test]
    fn test_incomplete_set_is_never_transmitted() {
        let cfg = RenderConfig {
            pwm_res: 6,
            lsb_period: Duration::from_micros(50),
        };
        let slot = Arc::new(DutySlot::new());
        // Four planes published, six required.
        slot.publish(DutyCycleSet::encode(&[1.0; NUM_CHANNELS], 4));

        let ops = run_for(cfg, slot, 30);

        // Only the init and drain frames went out: 16 clock pulses each.
        assert_eq!(clock_sets(&ops), 32);
        assert_eq!(ops.first(), Some(&GpioOp::Init));
        assert_eq!(ops.last(), Some(&GpioOp::Deinit));
    }

    #[test]
    fn test_complete_set_is_played_back() {
        let cfg = RenderConfig {
            pwm_res: 4,
            lsb_period: Duration::from_micros(50),
        };
        let slot = Arc::new(DutySlot::new());
        slot.publish(DutyCycleSet::encode(&[0.5; NUM_CHANNELS], 4));

        let ops = run_for(cfg, slot, 30);

        // Plane playback happened on top of the init and drain frames.
        assert!(clock_sets(&ops) > 32);
        assert_eq!(ops.last(), Some(&GpioOp::Deinit));
    }

    #[test]
    fn test_teardown_blanks_before_deinit() {
        let cfg = RenderConfig {
            pwm_res: 4,
            lsb_period: Duration::from_micros(50),
        };
        let slot = Arc::new(DutySlot::new());

        let ops = run_for(cfg, slot, 10);

        let blank_pos = ops
            .iter()
            .rposition(|op| *op == GpioOp::Set(PinRole::Blank))
            .unwrap();
        assert_eq!(ops.len() - 1, blank_pos + 1, "blank is the last op before deinit");
    }
}
