//! Amlogic backend (Odroid C1, C2 and N2).
//!
//! These SoCs expose per-bank output-enable and output-data registers, both
//! plain read-modify-write: clearing a pin's output-enable bit makes it an
//! output, and its level is a bit in the bank's data register. The three
//! boards only differ in base address and in which (bank, bit) each control
//! pin landed on, so the whole family is one backend driven by a pin table.

use super::mem::RegisterBlock;
use super::{GpioBackend, GpioError, PinRole};

/// Register coordinates of one pin: output-enable register, output data
/// register (word indices into the mapped page) and the bit within both.
#[derive(Debug, Clone, Copy)]
struct PinMap {
    oen: usize,
    out: usize,
    bit: u32,
}

/// Pin tables per role, ordered DATA, CLOCK, LATCH, BLANK.
type PinTable = [PinMap; 4];

const ODROID_C1_BASE: u64 = 0xC110_8000;
const ODROID_C2_BASE: u64 = 0xC883_4000;
const ODROID_N2_BASE: u64 = 0xFF63_4000;

// C1 spans two banks: DATA sits on bank Y, the rest on bank X.
#[rustfmt::skip]
const ODROID_C1_PINS: PinTable = [
    PinMap { oen: 0x0F, out: 0x10, bit: 8 },  // data,  Y.8
    PinMap { oen: 0x0C, out: 0x0D, bit: 19 }, // clock, X.19
    PinMap { oen: 0x0C, out: 0x0D, bit: 18 }, // latch, X.18
    PinMap { oen: 0x0C, out: 0x0D, bit: 6 },  // blank, X.6
];

#[rustfmt::skip]
const ODROID_C2_PINS: PinTable = [
    PinMap { oen: 0x118, out: 0x119, bit: 19 }, // data,  X.19
    PinMap { oen: 0x118, out: 0x119, bit: 11 }, // clock, X.11
    PinMap { oen: 0x118, out: 0x119, bit: 9 },  // latch, X.9
    PinMap { oen: 0x118, out: 0x119, bit: 3 },  // blank, X.3
];

#[rustfmt::skip]
const ODROID_N2_PINS: PinTable = [
    PinMap { oen: 0x116, out: 0x117, bit: 3 }, // data,  X.3
    PinMap { oen: 0x116, out: 0x117, bit: 4 }, // clock, X.4
    PinMap { oen: 0x116, out: 0x117, bit: 7 }, // latch, X.7
    PinMap { oen: 0x116, out: 0x117, bit: 2 }, // blank, X.2
];

pub struct MesonGpio {
    regs: RegisterBlock,
    pins: PinTable,
}

impl MesonGpio {
    pub fn odroid_c1() -> Result<Self, GpioError> {
        Self::open(ODROID_C1_BASE, ODROID_C1_PINS)
    }

    pub fn odroid_c2() -> Result<Self, GpioError> {
        Self::open(ODROID_C2_BASE, ODROID_C2_PINS)
    }

    pub fn odroid_n2() -> Result<Self, GpioError> {
        Self::open(ODROID_N2_BASE, ODROID_N2_PINS)
    }

    fn open(base: u64, pins: PinTable) -> Result<Self, GpioError> {
        Ok(Self {
            regs: RegisterBlock::map(base)?,
            pins,
        })
    }

    fn pin(&self, role: PinRole) -> PinMap {
        self.pins[match role {
            PinRole::Data => 0,
            PinRole::Clock => 1,
            PinRole::Latch => 2,
            PinRole::Blank => 3,
        }]
    }
}

impl GpioBackend for MesonGpio {
    fn init(&mut self) {
        // Output-enable bit cleared means the pin drives its data bit.
        for pin in self.pins {
            self.regs.clear_bits(pin.oen, 1 << pin.bit);
        }

        self.set_pin(PinRole::Blank);
        self.clear_pin(PinRole::Data);
        self.clear_pin(PinRole::Clock);
        self.clear_pin(PinRole::Latch);
    }

    fn deinit(&mut self) {
        for pin in self.pins {
            self.regs.set_bits(pin.oen, 1 << pin.bit);
        }
    }

    fn set_pin(&mut self, role: PinRole) {
        let pin = self.pin(role);
        self.regs.set_bits(pin.out, 1 << pin.bit);
    }

    fn clear_pin(&mut self, role: PinRole) {
        let pin = self.pin(role);
        self.regs.clear_bits(pin.out, 1 << pin.bit);
    }
}
