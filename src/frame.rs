//! Frame encoder and the shared duty-cycle slot.
//!
//! Brightness targets are quantized and transposed into bit-planes: for a
//! PWM resolution of `n` bits, one refresh cycle consists of `n` 16-bit
//! frames, where bit `k` of plane `i` carries bit `i` of channel `k`'s
//! quantized brightness. Played back with binary-weighted hold times this
//! costs `n` serial transmissions per cycle instead of the `2^n` steps a
//! naive duty counter would need.

use std::sync::Mutex;

use crate::pipeline::NUM_CHANNELS;

/// One complete PWM cycle: an ordered sequence of bit-planes, least
/// significant plane first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DutyCycleSet {
    planes: Vec<u16>,
}

impl DutyCycleSet {
    /// An empty set, i.e. "nothing published yet".
    pub fn empty() -> Self {
        Self::default()
    }

    /// Quantize 16 brightness values to `pwm_res` bits each and transpose
    /// them into bit-planes.
    pub fn encode(brightness: &[f32; NUM_CHANNELS], pwm_res: u8) -> Self {
        let max = (1u32 << pwm_res) - 1;

        let mut quantized = [0u16; NUM_CHANNELS];
        for (q, &b) in quantized.iter_mut().zip(brightness) {
            *q = (b.clamp(0.0, 1.0) * max as f32).round() as u16;
        }

        let mut planes = Vec::with_capacity(pwm_res as usize);
        for i in 0..pwm_res {
            let mut plane = 0u16;
            for (k, &q) in quantized.iter().enumerate() {
                plane |= ((q >> i) & 1) << k;
            }
            planes.push(plane);
        }
        Self { planes }
    }

    /// Whether the set holds at least `pwm_res` planes. The renderer must
    /// never play back anything that fails this check.
    pub fn is_complete(&self, pwm_res: u8) -> bool {
        self.planes.len() >= pwm_res as usize
    }

    pub fn plane(&self, index: usize) -> u16 {
        self.planes[index]
    }

    pub fn planes(&self) -> &[u16] {
        &self.planes
    }
}

/// The single object shared between the sampler and the renderer.
///
/// The sampler replaces the whole set under the lock (a brief, bounded
/// hold); the renderer only ever attempts a non-blocking snapshot and keeps
/// using its previous copy when the lock is contended. A stale frame is an
/// acceptable visual artifact, a stalled real-time loop is not.
#[derive(Debug, Default)]
pub struct DutySlot {
    inner: Mutex<DutyCycleSet>,
}

impl DutySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the published set. Partial updates are impossible
    /// by construction: the assignment is the only operation under the lock.
    pub fn publish(&self, set: DutyCycleSet) {
        *self.inner.lock().unwrap() = set;
    }

    /// Non-blocking copy of the published set into `dst`. Returns `false`
    /// and leaves `dst` untouched when the lock is currently held.
    pub fn try_snapshot(&self, dst: &mut DutyCycleSet) -> bool {
        match self.inner.try_lock() {
            Ok(guard) => {
                dst.clone_from(&guard);
                true
            }
            Err(_) => false,
        }
    }
}
