//! Physical register-block mapping through `/dev/mem`.

use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::os::unix::fs::OpenOptionsExt;
use std::ptr::NonNull;

use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};

use super::GpioError;

const DEV_MEM: &str = "/dev/mem";
const PAGE_SIZE: usize = 4096;
const PAGE_LEN: NonZeroUsize = NonZeroUsize::new(PAGE_SIZE).unwrap();

/// One page of memory-mapped hardware registers, accessed as 32-bit words.
///
/// All accesses are volatile: the compiler must not elide, merge or reorder
/// them relative to each other. Bus-level ordering against the CPU pipeline
/// is the transmitter's job (it fences around pin transitions).
pub struct RegisterBlock {
    base: NonNull<u32>,
}

// The mapping is process-private state; the raw pointer is only ever used
// through &self methods on the owning backend, which lives on one thread.
unsafe impl Send for RegisterBlock {}

impl RegisterBlock {
    /// Map one page of registers at the given physical address.
    pub fn map(phys_addr: u64) -> Result<Self, GpioError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(DEV_MEM)
            .map_err(|source| GpioError::MemOpen {
                path: DEV_MEM.to_string(),
                source,
            })?;

        let base = unsafe {
            mmap(
                None,
                PAGE_LEN,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                phys_addr as libc::off_t,
            )
        }
        .map_err(|source| GpioError::Map {
            addr: phys_addr,
            source,
        })?;

        Ok(Self { base: base.cast() })
    }

    /// Volatile read of the 32-bit register at word index `reg`.
    pub fn read(&self, reg: usize) -> u32 {
        debug_assert!(reg < PAGE_SIZE / 4);
        unsafe { self.base.as_ptr().add(reg).read_volatile() }
    }

    /// Volatile write of the 32-bit register at word index `reg`.
    pub fn write(&self, reg: usize, value: u32) {
        debug_assert!(reg < PAGE_SIZE / 4);
        unsafe { self.base.as_ptr().add(reg).write_volatile(value) }
    }

    /// Read-modify-write setting `mask` bits.
    pub fn set_bits(&self, reg: usize, mask: u32) {
        self.write(reg, self.read(reg) | mask);
    }

    /// Read-modify-write clearing `mask` bits.
    pub fn clear_bits(&self, reg: usize, mask: u32) {
        self.write(reg, self.read(reg) & !mask);
    }
}

impl Drop for RegisterBlock {
    fn drop(&mut self) {
        // Nothing useful to do on failure during teardown.
        let _ = unsafe { munmap(self.base.cast(), PAGE_SIZE) };
    }
}
