//! Broadcom BCM283x backend (Raspberry Pi 3 and 4).
//!
//! The BCM GPIO block has dedicated write-only set (GPSET0) and clear
//! (GPCLR0) registers, so driving a pin is a single store with no
//! read-modify-write race. Pin modes live in the GPFSEL registers as 3-bit
//! fields, ten pins per register.

use super::mem::RegisterBlock;
use super::{GpioBackend, GpioError, PinRole};

const PIN_DATA: u32 = 17;
const PIN_CLOCK: u32 = 27;
const PIN_LATCH: u32 = 22;
const PIN_BLANK: u32 = 25;

const GPSET0: usize = 7;
const GPCLR0: usize = 10;

const PI3_BASE: u64 = 0x3F20_0000;
const PI4_BASE: u64 = 0xFE20_0000;

const ALL_PINS: [u32; 4] = [PIN_DATA, PIN_CLOCK, PIN_LATCH, PIN_BLANK];

pub struct BcmGpio {
    regs: RegisterBlock,
}

impl BcmGpio {
    pub fn pi3() -> Result<Self, GpioError> {
        Self::open(PI3_BASE)
    }

    pub fn pi4() -> Result<Self, GpioError> {
        Self::open(PI4_BASE)
    }

    fn open(base: u64) -> Result<Self, GpioError> {
        Ok(Self {
            regs: RegisterBlock::map(base)?,
        })
    }

    fn fsel_reg(pin: u32) -> usize {
        (pin / 10) as usize
    }

    fn fsel_shift(pin: u32) -> u32 {
        (pin % 10) * 3
    }

    fn pin(role: PinRole) -> u32 {
        match role {
            PinRole::Data => PIN_DATA,
            PinRole::Clock => PIN_CLOCK,
            PinRole::Latch => PIN_LATCH,
            PinRole::Blank => PIN_BLANK,
        }
    }
}

impl GpioBackend for BcmGpio {
    fn init(&mut self) {
        for pin in ALL_PINS {
            // Reset the 3-bit mode field to input, then set it to output.
            self.regs
                .clear_bits(Self::fsel_reg(pin), 7 << Self::fsel_shift(pin));
            self.regs
                .set_bits(Self::fsel_reg(pin), 1 << Self::fsel_shift(pin));
        }

        // Display off until the renderer has pushed a defined frame.
        self.set_pin(PinRole::Blank);
        self.clear_pin(PinRole::Data);
        self.clear_pin(PinRole::Clock);
        self.clear_pin(PinRole::Latch);
    }

    fn deinit(&mut self) {
        // Back to the power-on default: everything an input.
        for pin in ALL_PINS {
            self.regs
                .clear_bits(Self::fsel_reg(pin), 7 << Self::fsel_shift(pin));
        }
    }

    fn set_pin(&mut self, role: PinRole) {
        self.regs.write(GPSET0, 1 << Self::pin(role));
    }

    fn clear_pin(&mut self, role: PinRole) {
        self.regs.write(GPCLR0, 1 << Self::pin(role));
    }
}
