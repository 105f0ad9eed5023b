//! Recording GPIO backend for tests and hardware-free runs.

use std::sync::{Arc, Mutex};

use super::{GpioBackend, PinRole};

/// One recorded backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOp {
    Init,
    Set(PinRole),
    Clear(PinRole),
    Deinit,
}

/// Backend that appends every operation to a shared log instead of touching
/// registers. Clone the log handle before moving the backend into the
/// renderer to inspect traffic afterwards.
#[derive(Debug, Default)]
pub struct MockGpio {
    log: Arc<Mutex<Vec<GpioOp>>>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the operation log.
    pub fn log(&self) -> Arc<Mutex<Vec<GpioOp>>> {
        Arc::clone(&self.log)
    }

    fn record(&self, op: GpioOp) {
        self.log.lock().unwrap().push(op);
    }
}

impl GpioBackend for MockGpio {
    fn init(&mut self) {
        self.record(GpioOp::Init);
    }

    fn deinit(&mut self) {
        self.record(GpioOp::Deinit);
    }

    fn set_pin(&mut self, role: PinRole) {
        self.record(GpioOp::Set(role));
    }

    fn clear_pin(&mut self, role: PinRole) {
        self.record(GpioOp::Clear(role));
    }
}
