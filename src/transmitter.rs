//! Shift-register serial transmission protocol.
//!
//! The LED driver is a serial-in, parallel-out shift register: bits are
//! clocked in one at a time, most significant (channel 15) first, and only
//! appear on the outputs after a latch pulse. Keeping the data shift and
//! the latch separate lets the renderer line the latch up with its PWM
//! deadlines.
//!
//! Every pin transition is bracketed by a full memory fence. The GPIO
//! registers are mapped memory; without the fences the CPU or compiler may
//! reorder the stores and silently corrupt the displayed brightness with no
//! software-visible symptom. This is the correctness-critical property of
//! the whole transmission path.

use std::sync::atomic::{Ordering, fence};

use crate::gpio::{GpioBackend, PinRole};

/// Drives the shift register through a [`GpioBackend`].
pub struct ShiftRegister<B: GpioBackend> {
    gpio: B,
}

impl<B: GpioBackend> ShiftRegister<B> {
    pub fn new(gpio: B) -> Self {
        Self { gpio }
    }

    /// Configure the pins; display stays blanked until [`unblank`] is called.
    ///
    /// [`unblank`]: Self::unblank
    pub fn init(&mut self) {
        self.gpio.init();
    }

    /// Restore the pins to their default mode.
    pub fn deinit(&mut self) {
        self.gpio.deinit();
    }

    /// Clock all 16 bits into the driver chip without latching them.
    pub fn send_frame(&mut self, bits: u16) {
        for i in (0..16).rev() {
            fence(Ordering::SeqCst);
            self.gpio.clear_pin(PinRole::Clock);
            if (bits >> i) & 1 == 1 {
                self.gpio.set_pin(PinRole::Data);
            } else {
                self.gpio.clear_pin(PinRole::Data);
            }
            fence(Ordering::SeqCst);
            self.gpio.set_pin(PinRole::Clock);
        }
    }

    /// Pulse the latch pin, applying whatever was previously shifted in.
    pub fn commit_frame(&mut self) {
        fence(Ordering::SeqCst);
        self.gpio.set_pin(PinRole::Latch);
        fence(Ordering::SeqCst);
        self.gpio.clear_pin(PinRole::Latch);
    }

    /// Force the display dark regardless of the shift register contents.
    pub fn blank(&mut self) {
        fence(Ordering::SeqCst);
        self.gpio.set_pin(PinRole::Blank);
    }

    /// Re-enable the display outputs.
    pub fn unblank(&mut self) {
        fence(Ordering::SeqCst);
        self.gpio.clear_pin(PinRole::Blank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::mock::{GpioOp, MockGpio};

    #[test]
    fn test_send_frame_bit_order() {
        let gpio = MockGpio::new();
        let log = gpio.log();
        let mut sr = ShiftRegister::new(gpio);

        sr.send_frame(0xA5A5);

        let ops = log.lock().unwrap().clone();
        assert_eq!(ops.len(), 48);

        for (i, chunk) in ops.chunks(3).enumerate() {
            let bit = (0xA5A5u16 >> (15 - i)) & 1 == 1;
            assert_eq!(chunk[0], GpioOp::Clear(PinRole::Clock), "bit {i}");
            if bit {
                assert_eq!(chunk[1], GpioOp::Set(PinRole::Data), "bit {i}");
            } else {
                assert_eq!(chunk[1], GpioOp::Clear(PinRole::Data), "bit {i}");
            }
            assert_eq!(chunk[2], GpioOp::Set(PinRole::Clock), "bit {i}");
        }
    }

    #[test]
    fn test_clock_toggles_sixteen_times() {
        let gpio = MockGpio::new();
        let log = gpio.log();
        let mut sr = ShiftRegister::new(gpio);

        sr.send_frame(0xFFFF);

        let ops = log.lock().unwrap().clone();
        let lows = ops
            .iter()
            .filter(|op| **op == GpioOp::Clear(PinRole::Clock))
            .count();
        let highs = ops
            .iter()
            .filter(|op| **op == GpioOp::Set(PinRole::Clock))
            .count();
        assert_eq!(lows, 16);
        assert_eq!(highs, 16);
    }

    #[test]
    fn test_commit_is_a_latch_pulse() {
        let gpio = MockGpio::new();
        let log = gpio.log();
        let mut sr = ShiftRegister::new(gpio);

        sr.commit_frame();

        let ops = log.lock().unwrap().clone();
        assert_eq!(
            ops,
            vec![GpioOp::Set(PinRole::Latch), GpioOp::Clear(PinRole::Latch)]
        );
    }

    #[test]
    fn test_blank_unblank_drive_blank_pin() {
        let gpio = MockGpio::new();
        let log = gpio.log();
        let mut sr = ShiftRegister::new(gpio);

        sr.blank();
        sr.unblank();

        let ops = log.lock().unwrap().clone();
        assert_eq!(
            ops,
            vec![GpioOp::Set(PinRole::Blank), GpioOp::Clear(PinRole::Blank)]
        );
    }
}
