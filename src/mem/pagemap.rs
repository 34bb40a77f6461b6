//! Virtual to physical page mapping
//!
//! DMA control blocks carry bus addresses, so every page of the locked buffer
//! has to be resolved to the physical frame backing it. Linux exports this
//! through `/proc/self/pagemap`: one 64-bit record per virtual page.
//!
//! Reference: https://www.kernel.org/doc/Documentation/vm/pagemap.txt

use crate::board::Board;
use crate::error::{Error, Result};
use crate::hal::mmio::{PAGE_SHIFT, PAGE_SIZE};
use byteorder::{NativeEndian, ReadBytesExt};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Size of one pagemap record
pub const PAGEMAP_ENTRY_SIZE: u64 = 8;

/// Pagemap record bits
pub mod entry_bits {
    /// Page present in RAM
    pub const PRESENT: u64 = 1 << 63;
    /// Page swapped out
    pub const SWAPPED: u64 = 1 << 62;
    /// Page frame number, bits 0-54
    pub const PFN_MASK: u64 = (1 << 55) - 1;
}

/// Extract the frame number from a pagemap record
pub fn parse_entry(raw: u64, virt: usize) -> Result<u64> {
    if raw & entry_bits::PRESENT == 0 {
        let state = if raw & entry_bits::SWAPPED != 0 {
            "swapped out"
        } else {
            "not present"
        };
        return Err(Error::allocation(format!(
            "page at 0x{:x} is {} (entry 0x{:016x})",
            virt, state, raw
        )));
    }
    let pfn = raw & entry_bits::PFN_MASK;
    if pfn == 0 {
        // Kernels since 4.0 zero the PFN for readers without CAP_SYS_ADMIN
        return Err(Error::allocation(format!(
            "page at 0x{:x} reports frame 0; reading physical frames requires root",
            virt
        )));
    }
    Ok(pfn)
}

/// Resolves the physical frame behind a virtual page
pub trait FrameSource {
    fn frame_of(&mut self, virt: usize) -> Result<u64>;
}

/// Frame source reading a pagemap file
pub struct ProcPagemap<R = File> {
    reader: R,
    path: PathBuf,
}

impl ProcPagemap<File> {
    /// The current process's own page table export
    pub const SELF_PATH: &'static str = "/proc/self/pagemap";

    pub fn open(path: &Path) -> Result<Self> {
        let reader = File::open(path).map_err(|e| {
            Error::allocation(format!("failed to open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            reader,
            path: path.to_path_buf(),
        })
    }
}

impl<R: Read + Seek> ProcPagemap<R> {
    pub fn from_reader(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
        }
    }
}

impl<R: Read + Seek> FrameSource for ProcPagemap<R> {
    fn frame_of(&mut self, virt: usize) -> Result<u64> {
        let offset = (virt as u64 >> PAGE_SHIFT) * PAGEMAP_ENTRY_SIZE;
        let pos = self.reader.seek(SeekFrom::Start(offset)).map_err(|e| {
            Error::allocation(format!("failed to seek on {}: {}", self.path.display(), e))
        })?;
        if pos != offset {
            return Err(Error::allocation(format!(
                "seek on {} landed at {} instead of {}",
                self.path.display(),
                pos,
                offset
            )));
        }
        let raw = self.reader.read_u64::<NativeEndian>().map_err(|e| {
            Error::allocation(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        parse_entry(raw, virt)
    }
}

/// Hands out consecutive fake frames, for running without hardware
#[derive(Debug, Clone)]
pub struct SimulatedFrames {
    next: u64,
}

impl SimulatedFrames {
    pub fn starting_at(first_pfn: u64) -> Self {
        Self { next: first_pfn }
    }
}

impl Default for SimulatedFrames {
    fn default() -> Self {
        Self::starting_at(0x1000)
    }
}

impl FrameSource for SimulatedFrames {
    fn frame_of(&mut self, _virt: usize) -> Result<u64> {
        let pfn = self.next;
        self.next += 1;
        Ok(pfn)
    }
}

/// One locked page: where the CPU sees it and where the DMA engine sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMapEntry {
    pub virt: usize,
    /// Bus address of the backing frame
    pub phys: u32,
}

/// Page map of a contiguous virtual region
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    entries: Vec<PageMapEntry>,
}

impl PageMap {
    /// Resolve `page_count` pages starting at `base`
    pub fn build(
        base: usize,
        page_count: usize,
        board: &Board,
        frames: &mut dyn FrameSource,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(page_count);
        for i in 0..page_count {
            let virt = base + i * PAGE_SIZE;
            let pfn = frames.frame_of(virt)?;
            entries.push(PageMapEntry {
                virt,
                phys: board.frame_to_bus(pfn)?,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PageMapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bus address of a virtual address inside the region
    pub fn virt_to_phys(&self, virt: usize) -> Result<u32> {
        let base = self.entries.first().ok_or(Error::Lookup { address: virt })?.virt;
        let offset = virt.checked_sub(base).ok_or(Error::Lookup { address: virt })?;
        let entry = self
            .entries
            .get(offset >> PAGE_SHIFT)
            .ok_or(Error::Lookup { address: virt })?;
        Ok(entry.phys + (offset % PAGE_SIZE) as u32)
    }

    /// Virtual address of a bus address inside the region
    pub fn phys_to_virt(&self, phys: u32) -> Result<usize> {
        let page_offset = phys as usize & (PAGE_SIZE - 1);
        let page = phys - page_offset as u32;
        self.entries
            .iter()
            .find(|e| e.phys == page)
            .map(|e| e.virt + page_offset)
            .ok_or(Error::Lookup {
                address: phys as usize,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{RPI1, RPI4};
    use std::io::Cursor;

    const BASE: usize = 0x1000_0000;

    fn pagemap_image(base: usize, pfns: &[u64]) -> Cursor<Vec<u8>> {
        let first = (base >> PAGE_SHIFT) * PAGEMAP_ENTRY_SIZE as usize;
        let mut bytes = vec![0u8; first + pfns.len() * 8];
        for (i, pfn) in pfns.iter().enumerate() {
            let raw = entry_bits::PRESENT | pfn;
            bytes[first + i * 8..first + i * 8 + 8].copy_from_slice(&raw.to_ne_bytes());
        }
        Cursor::new(bytes)
    }

    fn sample_map() -> PageMap {
        let mut frames = ProcPagemap::from_reader(pagemap_image(BASE, &[0x300, 0x120, 0x121]), "test");
        PageMap::build(BASE, 3, &RPI1, &mut frames).unwrap()
    }

    #[test]
    fn test_parse_present_entry() {
        assert_eq!(parse_entry(entry_bits::PRESENT | 0x1234, 0).unwrap(), 0x1234);
    }

    #[test]
    fn test_parse_rejects_missing_page() {
        assert!(matches!(parse_entry(0x1234, 0), Err(Error::Allocation(_))));
        assert!(matches!(
            parse_entry(entry_bits::SWAPPED | 0x1234, 0),
            Err(Error::Allocation(_))
        ));
        // Unprivileged readers see a zero frame
        assert!(parse_entry(entry_bits::PRESENT, 0).is_err());
    }

    #[test]
    fn test_build_from_pagemap() {
        let map = sample_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map.entries()[0].phys, 0x4030_0000);
        assert_eq!(map.entries()[2].virt, BASE + 2 * PAGE_SIZE);
    }

    #[test]
    fn test_round_trip_every_page() {
        let map = sample_map();
        for entry in map.entries() {
            assert_eq!(map.virt_to_phys(map.phys_to_virt(entry.phys).unwrap()).unwrap(), entry.phys);
            assert_eq!(map.phys_to_virt(map.virt_to_phys(entry.virt).unwrap()).unwrap(), entry.virt);
        }
    }

    #[test]
    fn test_offsets_within_page() {
        let map = sample_map();
        assert_eq!(map.virt_to_phys(BASE + PAGE_SIZE + 0x40).unwrap(), 0x4012_0040);
        assert_eq!(map.phys_to_virt(0x4012_1FFC).unwrap(), BASE + 2 * PAGE_SIZE + 0xFFC);
    }

    #[test]
    fn test_lookups_outside_region_fail() {
        let map = sample_map();
        assert!(matches!(map.virt_to_phys(BASE - 4), Err(Error::Lookup { .. })));
        assert!(matches!(map.virt_to_phys(BASE + 3 * PAGE_SIZE), Err(Error::Lookup { .. })));
        assert!(matches!(map.phys_to_virt(0x4050_0000), Err(Error::Lookup { .. })));
        assert!(PageMap::default().virt_to_phys(BASE).is_err());
    }

    #[test]
    fn test_high_memory_frame_fails_build() {
        // 0x100001 would alias frame 0x1 if truncated to 32 bits
        let mut frames = ProcPagemap::from_reader(pagemap_image(BASE, &[0x10_0001, 0x1]), "test");
        assert!(matches!(
            PageMap::build(BASE, 2, &RPI4, &mut frames),
            Err(Error::Allocation(_))
        ));
    }

    #[test]
    fn test_short_pagemap_read_fails() {
        let mut frames = ProcPagemap::from_reader(pagemap_image(BASE, &[0x300]), "test");
        assert!(PageMap::build(BASE, 2, &RPI1, &mut frames).is_err());
    }

    #[test]
    fn test_simulated_frames_are_distinct() {
        let mut frames = SimulatedFrames::default();
        let map = PageMap::build(BASE, 4, &RPI1, &mut frames).unwrap();
        assert_eq!(map.entries()[3].phys - map.entries()[0].phys, 3 * PAGE_SIZE as u32);
    }
}
