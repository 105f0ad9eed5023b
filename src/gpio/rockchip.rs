//! Rockchip RK3568 backend (Odroid M1).
//!
//! Rockchip GPIO data and direction registers are split into low/high
//! half-words, and every write must carry a write-enable mask in the upper
//! 16 bits: only bits whose mask bit is set take effect. Both the value bit
//! and its mask bit have to land in the same 32-bit store, otherwise a
//! concurrent change to another pin in the same register word can be lost.
//! That encoding is a hardware protocol requirement and stays entirely
//! inside this backend.
//!
//! The pins used here live in two GPIO banks whose register blocks are a
//! few megabytes apart, hence the two mappings.

use super::mem::RegisterBlock;
use super::{GpioBackend, GpioError, PinRole};

const BANK0_BASE: u64 = 0xFDD6_0000;
const BANK3_BASE: u64 = 0xFE76_0000;

// Word indices of the data (DR) and direction (DDR) registers, low and high
// half-word variants.
const DR_L: usize = 0x00;
const DR_H: usize = 0x01;
const DDR_L: usize = 0x02;
const DDR_H: usize = 0x03;

/// Register coordinates of one pin within its bank.
#[derive(Debug, Clone, Copy)]
struct PinMap {
    bank3: bool,
    dr: usize,
    ddr: usize,
    bit: u32,
}

// DATA = 0C.0, CLOCK = 0C.1 (bank 0, high half), LATCH = 3B.2 (bank 3, low
// half), BLANK = 3D.1 (bank 3, high half).
#[rustfmt::skip]
const PINS: [PinMap; 4] = [
    PinMap { bank3: false, dr: DR_H, ddr: DDR_H, bit: 0 },  // data
    PinMap { bank3: false, dr: DR_H, ddr: DDR_H, bit: 1 },  // clock
    PinMap { bank3: true,  dr: DR_L, ddr: DDR_L, bit: 10 }, // latch
    PinMap { bank3: true,  dr: DR_H, ddr: DDR_H, bit: 9 },  // blank
];

pub struct RockchipGpio {
    bank0: RegisterBlock,
    bank3: RegisterBlock,
}

impl RockchipGpio {
    pub fn odroid_m1() -> Result<Self, GpioError> {
        Ok(Self {
            bank0: RegisterBlock::map(BANK0_BASE)?,
            bank3: RegisterBlock::map(BANK3_BASE)?,
        })
    }

    fn pin(role: PinRole) -> PinMap {
        PINS[match role {
            PinRole::Data => 0,
            PinRole::Clock => 1,
            PinRole::Latch => 2,
            PinRole::Blank => 3,
        }]
    }

    fn bank(&self, pin: PinMap) -> &RegisterBlock {
        if pin.bank3 { &self.bank3 } else { &self.bank0 }
    }

    /// Masked half-word write: value bit plus its write-enable bit at
    /// `bit + 16`, in one store.
    fn write_masked(&self, pin: PinMap, reg: usize, value: bool) {
        let bank = self.bank(pin);
        bank.write(reg, masked_word(bank.read(reg), pin.bit, value));
    }
}

/// Encode a single-bit update for a Rockchip half-word register: the value
/// bit and its write-enable bit at `bit + 16` must go out in the same word.
fn masked_word(current: u32, bit: u32, value: bool) -> u32 {
    let mut word = current | (1 << (bit + 16));
    if value {
        word |= 1 << bit;
    } else {
        word &= !(1 << bit);
    }
    word
}

impl GpioBackend for RockchipGpio {
    fn init(&mut self) {
        // Direction bit set means output on this family.
        for pin in PINS {
            self.write_masked(pin, pin.ddr, true);
        }

        self.set_pin(PinRole::Blank);
        self.clear_pin(PinRole::Data);
        self.clear_pin(PinRole::Clock);
        self.clear_pin(PinRole::Latch);
    }

    fn deinit(&mut self) {
        for pin in PINS {
            self.write_masked(pin, pin.ddr, false);
        }
    }

    fn set_pin(&mut self, role: PinRole) {
        let pin = Self::pin(role);
        self.write_masked(pin, pin.dr, true);
    }

    fn clear_pin(&mut self, role: PinRole) {
        let pin = Self::pin(role);
        self.write_masked(pin, pin.dr, false);
    }
}
