//! Process-shared user level value.
//!
//! The 16th display channel is driven by a value injected from outside the
//! service. It lives in a named POSIX shared-memory region holding a single
//! IEEE-754 f32 in [0, 1], created by the service and written by separate
//! `set-level` invocations of the same binary. The float travels as atomic
//! u32 bits so concurrent reader and writer never observe a torn value.

use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use nix::fcntl::OFlag;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap, shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use thiserror::Error;

/// Default name of the shared-memory object.
pub const DEFAULT_SHM_NAME: &str = "/ledbarmon";

const REGION_LEN: NonZeroUsize = NonZeroUsize::new(size_of::<u32>()).unwrap();

/// Shared level region error types
#[derive(Error, Debug)]
pub enum LevelError {
    #[error("cannot create shared level region {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: nix::Error,
    },
    #[error("cannot open shared level region {name}: {source} (is the service running?)")]
    Open {
        name: String,
        #[source]
        source: nix::Error,
    },
    #[error("cannot size shared level region {name}: {source}")]
    Size {
        name: String,
        #[source]
        source: nix::Error,
    },
    #[error("cannot map shared level region {name}: {source}")]
    Map {
        name: String,
        #[source]
        source: nix::Error,
    },
}

/// Handle to the shared user-level float.
///
/// The creating side owns the name and unlinks it on drop; `set-level`
/// opens the existing region and leaves the name in place.
pub struct LevelRegion {
    cell: NonNull<AtomicU32>,
    name: String,
    owned: bool,
}

// The region is a single atomic cell; all access goes through it.
unsafe impl Send for LevelRegion {}
unsafe impl Sync for LevelRegion {}

impl LevelRegion {
    /// Create (or reuse) the region and reset the level to zero.
    pub fn create(name: &str) -> Result<Self, LevelError> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH,
        )
        .map_err(|source| LevelError::Create {
            name: name.to_string(),
            source,
        })?;

        ftruncate(&fd, REGION_LEN.get() as libc::off_t).map_err(|source| LevelError::Size {
            name: name.to_string(),
            source,
        })?;

        let region = Self::map(fd, name, true)?;
        region.write(0.0);
        Ok(region)
    }

    /// Open an existing region created by a running service.
    pub fn open(name: &str) -> Result<Self, LevelError> {
        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty()).map_err(|source| {
            LevelError::Open {
                name: name.to_string(),
                source,
            }
        })?;
        Self::map(fd, name, false)
    }

    fn map(fd: OwnedFd, name: &str, owned: bool) -> Result<Self, LevelError> {
        let base = unsafe {
            mmap(
                None,
                REGION_LEN,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
        }
        .map_err(|source| LevelError::Map {
            name: name.to_string(),
            source,
        })?;

        Ok(Self {
            cell: base.cast(),
            name: name.to_string(),
            owned,
        })
    }

    /// Current level, always in [0, 1] because writes clamp.
    pub fn read(&self) -> f32 {
        let bits = unsafe { self.cell.as_ref() }.load(Ordering::Relaxed);
        f32::from_bits(bits)
    }

    /// Store a new level, clamped to [0, 1]. NaN is treated as zero.
    pub fn write(&self, value: f32) {
        let clamped = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
        unsafe { self.cell.as_ref() }.store(clamped.to_bits(), Ordering::Relaxed);
    }
}

impl Drop for LevelRegion {
    fn drop(&mut self) {
        let _ = unsafe { munmap(self.cell.cast(), REGION_LEN.get()) };
        if self.owned {
            let _ = shm_unlink(self.name.as_str());
        }
    }
}
