//! Peripheral memory mapping
//!
//! Register blocks are mapped out of `/dev/mem` and accessed through
//! [`RegisterBlock`], which only accepts register names belonging to that
//! peripheral. The block checks at construction that the mapped window covers
//! every register the peripheral declares, so no access can land outside it.

use crate::error::{Error, Result};
use log::debug;
use std::fs::OpenOptions;
use std::io;
use std::marker::PhantomData;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};

/// Size of a memory page on every supported board
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: usize = 12;

/// Round a length up to a whole number of pages
pub const fn page_align(len: usize) -> usize {
    (len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// A region of memory mapped into the process, released on drop
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
    mapped_len: usize,
}

impl MappedRegion {
    /// Map `len` bytes of physical memory starting at `base` through `device`
    ///
    /// `base` must be page aligned, which holds for every peripheral block on
    /// the supported boards.
    pub fn map(device: &Path, base: u32, len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device)
            .map_err(|source| Error::Map {
                what: "raw memory device",
                base,
                hint: if source.kind() == io::ErrorKind::PermissionDenied {
                    " (try running as root)"
                } else {
                    ""
                },
                source,
            })?;

        let mapped_len = page_align(len);
        // SAFETY: the file descriptor is valid for the duration of the call and
        // the kernel validates the offset; the mapping outlives the descriptor.
        let addr = unsafe { mmap_shared(file.as_raw_fd(), mapped_len, base) };
        if addr == libc::MAP_FAILED {
            return Err(Error::Map {
                what: "peripheral",
                base,
                source: io::Error::last_os_error(),
                hint: "",
            });
        }

        debug!("Mapped 0x{:x} bytes of {} at 0x{:08x}", len, device.display(), base);
        Self::from_raw(addr, len, mapped_len)
    }

    /// Map a zeroed anonymous region that behaves like a register window
    ///
    /// Used by the simulated backend; needs no privileges.
    pub fn anonymous(len: usize) -> Result<Self> {
        let mapped_len = page_align(len.max(1));
        // SAFETY: anonymous private mapping, no file descriptor involved.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::Map {
                what: "anonymous region",
                base: 0,
                source: io::Error::last_os_error(),
                hint: "",
            });
        }
        Self::from_raw(addr, len, mapped_len)
    }

    fn from_raw(addr: *mut libc::c_void, len: usize, mapped_len: usize) -> Result<Self> {
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| Error::Map {
            what: "region",
            base: 0,
            source: io::Error::new(io::ErrorKind::Other, "mmap returned null"),
            hint: "",
        })?;
        Ok(Self { ptr, len, mapped_len })
    }

    /// Usable length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the 32-bit word at a byte offset, if it lies inside the region
    pub fn read_word(&self, offset: usize) -> Option<u32> {
        if offset % 4 != 0 || offset + 4 > self.len {
            return None;
        }
        // SAFETY: bounds and alignment checked above.
        Some(unsafe { ptr::read_volatile(self.ptr.as_ptr().add(offset).cast::<u32>()) })
    }

    /// Write the 32-bit word at a byte offset; returns false if out of range
    pub fn write_word(&mut self, offset: usize, value: u32) -> bool {
        if offset % 4 != 0 || offset + 4 > self.len {
            return false;
        }
        // SAFETY: bounds and alignment checked above.
        unsafe { ptr::write_volatile(self.ptr.as_ptr().add(offset).cast::<u32>(), value) };
        true
    }
}

// 32-bit ARM has a 32-bit off_t, which cannot hold the BCM2711 peripheral base.
#[cfg(target_os = "linux")]
unsafe fn mmap_shared(fd: libc::c_int, len: usize, base: u32) -> *mut libc::c_void {
    libc::mmap64(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        libc::off64_t::from(base),
    )
}

#[cfg(not(target_os = "linux"))]
unsafe fn mmap_shared(fd: libc::c_int, len: usize, base: u32) -> *mut libc::c_void {
    libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        base as libc::off_t,
    )
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/mapped_len come from a successful mmap and are unmapped once.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.mapped_len);
        }
    }
}

/// A named 32-bit register inside one peripheral block
pub trait Register: Copy {
    /// Size of the peripheral's register block in bytes
    const BLOCK_LEN: usize;

    /// Byte offset of this register from the start of the block
    fn offset(self) -> usize;
}

/// Typed register accessor over a mapped peripheral window
pub struct RegisterBlock<R: Register> {
    region: MappedRegion,
    _regs: PhantomData<R>,
}

impl<R: Register> RegisterBlock<R> {
    /// Wrap a mapped region; fails if it cannot hold every register of `R`
    pub fn new(region: MappedRegion) -> Result<Self> {
        if region.len() < R::BLOCK_LEN {
            return Err(Error::Map {
                what: "register block",
                base: 0,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "window of 0x{:x} bytes is smaller than the 0x{:x} byte block",
                        region.len(),
                        R::BLOCK_LEN
                    ),
                ),
                hint: "",
            });
        }
        Ok(Self {
            region,
            _regs: PhantomData,
        })
    }

    /// Map the block for `R` at `base` through `device`
    pub fn map(device: &Path, base: u32) -> Result<Self> {
        Self::new(MappedRegion::map(device, base, R::BLOCK_LEN)?)
    }

    /// Back the block with anonymous memory
    pub fn simulated() -> Result<Self> {
        Self::new(MappedRegion::anonymous(R::BLOCK_LEN)?)
    }

    #[inline]
    pub fn read(&self, reg: R) -> u32 {
        self.region.read_word(reg.offset()).unwrap_or(0)
    }

    #[inline]
    pub fn write(&mut self, reg: R, value: u32) {
        self.region.write_word(reg.offset(), value);
    }

    /// Read-modify-write setting `mask`
    #[inline]
    pub fn set_bits(&mut self, reg: R, mask: u32) {
        let value = self.read(reg);
        self.write(reg, value | mask);
    }

    /// Read-modify-write clearing `mask`
    #[inline]
    pub fn clear_bits(&mut self, reg: R, mask: u32) {
        let value = self.read(reg);
        self.write(reg, value & !mask);
    }
}
