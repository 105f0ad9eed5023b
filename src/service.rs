//! Service wiring: context construction, thread spawning, signal handling.
//!
//! The two loops share exactly one mutable object, the duty-cycle slot, and
//! one stop flag. Everything else is constructed here once and handed into
//! the loop entry points; there is no process-global mutable state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::info;

use crate::frame::DutySlot;
use crate::gpio::{self, BackendKind};
use crate::level::LevelRegion;
use crate::renderer::{self, RenderConfig};
use crate::sampler::{self, SamplerConfig};

/// Complete service configuration as gathered from the CLI.
pub struct ServiceConfig {
    pub backend: BackendKind,
    pub refresh_hz: f32,
    pub sample_divider: u32,
    pub pwm_res: u8,
    pub lsb_period_us: u64,
    pub gamma: f32,
    pub brightness: f32,
    pub shm_name: String,
}

impl ServiceConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if !(2..=16).contains(&self.pwm_res) {
            bail!("pwm-res must be between 2 and 16, got {}", self.pwm_res);
        }
        if self.refresh_hz <= 0.0 {
            bail!("refresh-rate must be positive");
        }
        if self.sample_divider == 0 {
            bail!("sample-divider must be at least 1");
        }
        if self.lsb_period_us == 0 {
            bail!("lsb-period-us must be at least 1");
        }
        Ok(())
    }
}

/// Run the service until an interrupt or termination request arrives.
///
/// Fatal startup errors (register mapping, shared-memory creation) surface
/// here before either loop starts; after that only local recovery happens
/// inside the loops.
pub fn run(cfg: ServiceConfig) -> anyhow::Result<()> {
    cfg.validate()?;

    // Fail fast on the fatal errors, before spawning anything.
    let backend = gpio::open_backend(cfg.backend).context("opening GPIO backend")?;
    let level = Arc::new(
        LevelRegion::create(&cfg.shm_name).context("creating shared user-level region")?,
    );

    let slot = Arc::new(DutySlot::new());
    let stop = Arc::new(AtomicBool::new(false));

    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("installing signal handler")?;
    }

    info!(
        backend = ?cfg.backend,
        refresh_hz = cfg.refresh_hz,
        pwm_res = cfg.pwm_res,
        lsb_period_us = cfg.lsb_period_us,
        "service starting"
    );

    let render_cfg = RenderConfig {
        pwm_res: cfg.pwm_res,
        lsb_period: Duration::from_micros(cfg.lsb_period_us),
    };
    let renderer_thread = {
        let slot = Arc::clone(&slot);
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("pwm-renderer".to_string())
            .spawn(move || renderer::run(backend, &render_cfg, &slot, &stop))
            .context("spawning renderer thread")?
    };

    // The sampler runs on the main thread under normal scheduling.
    let sampler_cfg = SamplerConfig {
        refresh_hz: cfg.refresh_hz,
        sample_divider: cfg.sample_divider,
        pwm_res: cfg.pwm_res,
        gamma: cfg.gamma,
        brightness: cfg.brightness,
    };
    sampler::run(&sampler_cfg, &slot, &level, &stop);

    if renderer_thread.join().is_err() {
        bail!("renderer thread panicked");
    }

    info!("service stopped");
    // Dropping the level region unlinks the shared-memory name.
    Ok(())
}
