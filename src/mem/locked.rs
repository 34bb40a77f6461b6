//! Locked DMA buffer
//!
//! An anonymous shared mapping, pinned in RAM, whose pages have been touched
//! so the kernel has committed a physical frame to each one. The frames stay
//! put for the lifetime of the mapping, which is what lets the DMA engine
//! read from it by bus address.

use super::pagemap::{FrameSource, PageMap};
use crate::board::Board;
use crate::error::{Error, Result};
use crate::hal::mmio::{page_align, PAGE_SIZE};
use log::debug;
use std::io;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, Ordering};

/// Page-aligned, swap-excluded memory with a resolved page map
pub struct LockedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    page_map: PageMap,
}

impl LockedBuffer {
    /// Number of pages needed to hold `bytes`
    pub const fn pages_for(bytes: usize) -> usize {
        page_align(bytes) / PAGE_SIZE
    }

    /// Allocate `page_count` locked, zeroed pages and resolve their frames
    pub fn allocate(page_count: usize, board: &Board, frames: &mut dyn FrameSource) -> Result<Self> {
        if page_count == 0 {
            return Err(Error::allocation("cannot allocate an empty DMA buffer"));
        }
        let len = page_count * PAGE_SIZE;

        // SAFETY: anonymous mapping, no file descriptor; result checked below.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_LOCKED,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::allocation(format!(
                "failed to mmap {} locked pages: {}",
                page_count,
                io::Error::last_os_error()
            )));
        }
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| Error::allocation("mmap returned a null address"))?;

        // From here on the region is owned and unmapped on every exit path
        let mut buffer = Self {
            ptr,
            len,
            page_map: PageMap::default(),
        };

        let base = buffer.base();
        if base & (PAGE_SIZE - 1) != 0 {
            return Err(Error::allocation(format!(
                "virtual address 0x{:x} is not page aligned",
                base
            )));
        }

        for page in 0..page_count {
            // SAFETY: page * PAGE_SIZE < len. The write forces a frame to be committed.
            unsafe { ptr::write_volatile(buffer.ptr.as_ptr().add(page * PAGE_SIZE), 0) };
        }

        buffer.page_map = PageMap::build(base, page_count, board, frames)?;
        for (i, entry) in buffer.page_map.entries().iter().enumerate() {
            debug!(
                "Page {:2}: virtual 0x{:x} => bus 0x{:08x}",
                i, entry.virt, entry.phys
            );
        }
        Ok(buffer)
    }

    /// Virtual address of the first byte
    pub fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn page_map(&self) -> &PageMap {
        &self.page_map
    }

    /// Bus address of the byte at `offset`
    pub fn bus_address(&self, offset: usize) -> Result<u32> {
        if offset >= self.len {
            return Err(Error::Lookup {
                address: self.base().wrapping_add(offset),
            });
        }
        self.page_map.virt_to_phys(self.base() + offset)
    }

    /// Byte offset inside the buffer of a bus address
    pub fn offset_of(&self, bus_addr: u32) -> Result<usize> {
        Ok(self.page_map.phys_to_virt(bus_addr)? - self.base())
    }

    fn check_range(&self, offset: usize, words: usize) -> Result<()> {
        let end = offset
            .checked_add(words * 4)
            .ok_or(Error::Lookup { address: offset })?;
        if offset % 4 != 0 || end > self.len {
            return Err(Error::Lookup {
                address: self.base().wrapping_add(offset),
            });
        }
        Ok(())
    }

    /// Copy words into the buffer at a byte offset
    pub fn write_words(&mut self, offset: usize, words: &[u32]) -> Result<()> {
        self.check_range(offset, words.len())?;
        // SAFETY: range checked; offset is word aligned and the base is page aligned.
        unsafe {
            let dst = self.ptr.as_ptr().add(offset).cast::<u32>();
            for (i, word) in words.iter().enumerate() {
                ptr::write_volatile(dst.add(i), *word);
            }
        }
        // Make the data visible before the DMA engine is started
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Read words back from a byte offset
    pub fn read_words(&self, offset: usize, count: usize) -> Result<Vec<u32>> {
        self.check_range(offset, count)?;
        // SAFETY: range checked as above.
        let words = unsafe {
            let src = self.ptr.as_ptr().add(offset).cast::<u32>();
            (0..count).map(|i| ptr::read_volatile(src.add(i))).collect()
        };
        Ok(words)
    }
}

impl Drop for LockedBuffer {
    fn drop(&mut self) {
        debug!("Releasing {} byte DMA buffer", self.len);
        // SAFETY: the mapping was created in allocate and is released exactly once here.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}
