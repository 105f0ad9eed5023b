//! GPIO backend abstraction and runtime backend selection.
//!
//! Every supported board exposes the same four-pin capability; the register
//! protocols behind it differ wildly (dedicated set/clear registers on
//! Broadcom, read-modify-write banks on Amlogic, masked half-word writes on
//! Rockchip). Backends are selected by configuration at runtime so the
//! transmission path can be exercised against a mock without hardware.

pub mod bcm;
pub mod mem;
pub mod meson;
pub mod mock;
pub mod rockchip;

use clap::ValueEnum;
use thiserror::Error;

/// Logical function of one of the four shift-register control pins.
/// Roles are bound to physical pins per board and never change after init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    Data,
    Clock,
    Latch,
    Blank,
}

/// GPIO backend error types
#[derive(Error, Debug)]
pub enum GpioError {
    #[error("cannot open {path}: {source} (direct register access requires root)")]
    MemOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot map GPIO registers at {addr:#x}: {source}")]
    Map {
        addr: u64,
        #[source]
        source: nix::Error,
    },
}

/// Pin-level capability every platform implementation must satisfy.
///
/// Register mapping happens when the backend is constructed; `init` only
/// configures the four pins as outputs with BLANK active (display off) and
/// the others low, and `deinit` restores them to their default input mode.
pub trait GpioBackend: Send {
    fn init(&mut self);
    fn deinit(&mut self);

    /// Drive one pin high via its control register.
    fn set_pin(&mut self, role: PinRole);

    /// Drive one pin low via its control register.
    fn clear_pin(&mut self, role: PinRole);
}

impl GpioBackend for Box<dyn GpioBackend> {
    fn init(&mut self) {
        (**self).init()
    }

    fn deinit(&mut self) {
        (**self).deinit()
    }

    fn set_pin(&mut self, role: PinRole) {
        (**self).set_pin(role)
    }

    fn clear_pin(&mut self, role: PinRole) {
        (**self).clear_pin(role)
    }
}

/// Board selection, exposed as the `--backend` CLI flag.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BackendKind {
    Pi3,
    Pi4,
    OdroidC1,
    OdroidC2,
    OdroidN2,
    OdroidM1,
    /// Records pin operations instead of touching hardware.
    Mock,
}

/// Map the selected board's registers and return its backend.
///
/// Failure here (typically lack of privilege for `/dev/mem`) is fatal to
/// startup: there is no safe way to drive the display without register
/// access.
pub fn open_backend(kind: BackendKind) -> Result<Box<dyn GpioBackend>, GpioError> {
    let backend: Box<dyn GpioBackend> = match kind {
        BackendKind::Pi3 => Box::new(bcm::BcmGpio::pi3()?),
        BackendKind::Pi4 => Box::new(bcm::BcmGpio::pi4()?),
        BackendKind::OdroidC1 => Box::new(meson::MesonGpio::odroid_c1()?),
        BackendKind::OdroidC2 => Box::new(meson::MesonGpio::odroid_c2()?),
        BackendKind::OdroidN2 => Box::new(meson::MesonGpio::odroid_n2()?),
        BackendKind::OdroidM1 => Box::new(rockchip::RockchipGpio::odroid_m1()?),
        BackendKind::Mock => Box::new(mock::MockGpio::new()),
    };
    Ok(backend)
}
