//! DMA channel registers and control blocks
//!
//! The DMA engine reads its work from a [`ControlBlock`] in memory, addressed
//! by bus address. One block moves the waveform from the locked buffer into
//! the PWM FIFO, paced by the PWM's data request line, then halts.

use super::mmio::{Register, RegisterBlock};
use crate::waveform;

/// DMA channel register offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaReg {
    /// Control and status
    Cs = 0x00,
    /// Control block address
    ConblkAd = 0x04,
    /// Transfer information (loaded from the control block)
    Ti = 0x08,
    SourceAd = 0x0C,
    DestAd = 0x10,
    TxfrLen = 0x14,
    Stride = 0x18,
    NextConbk = 0x1C,
    /// Debug and error flags
    Debug = 0x20,
}

impl Register for DmaReg {
    const BLOCK_LEN: usize = crate::board::DMA_LEN;

    fn offset(self) -> usize {
        self as usize
    }
}

/// CS register bits
pub mod cs_bits {
    pub const ACTIVE: u32 = 1 << 0;
    /// Transfer complete (write 1 to clear)
    pub const END: u32 = 1 << 1;
    /// Interrupt status (write 1 to clear)
    pub const INT: u32 = 1 << 2;
    pub const DREQ: u32 = 1 << 3;
    pub const PAUSED: u32 = 1 << 4;
    pub const DREQ_STOPS_DMA: u32 = 1 << 5;
    pub const WAITING_FOR_OUTSTANDING_WRITES: u32 = 1 << 6;
    pub const ERROR: u32 = 1 << 8;
    pub const PRIORITY_SHIFT: u32 = 16;
    pub const PANIC_PRIORITY_SHIFT: u32 = 20;
    pub const WAIT_FOR_OUTSTANDING_WRITES: u32 = 1 << 28;
    pub const DISDEBUG: u32 = 1 << 29;
    pub const ABORT: u32 = 1 << 30;
    pub const RESET: u32 = 1 << 31;
}

/// Transfer information bits
pub mod ti_bits {
    pub const INTEN: u32 = 1 << 0;
    pub const TDMODE: u32 = 1 << 1;
    pub const WAIT_RESP: u32 = 1 << 3;
    pub const DEST_INC: u32 = 1 << 4;
    pub const DEST_WIDTH: u32 = 1 << 5;
    pub const DEST_DREQ: u32 = 1 << 6;
    pub const DEST_IGNORE: u32 = 1 << 7;
    pub const SRC_INC: u32 = 1 << 8;
    pub const SRC_WIDTH: u32 = 1 << 9;
    pub const SRC_DREQ: u32 = 1 << 10;
    pub const SRC_IGNORE: u32 = 1 << 11;
    pub const BURST_LENGTH_SHIFT: u32 = 12;
    pub const PERMAP_SHIFT: u32 = 16;
    pub const WAITS_SHIFT: u32 = 21;
    pub const NO_WIDE_BURSTS: u32 = 1 << 26;
}

/// DEBUG register bits
pub mod debug_bits {
    pub const READ_LAST_NOT_SET_ERROR: u32 = 1 << 0;
    pub const FIFO_ERROR: u32 = 1 << 1;
    pub const READ_ERROR: u32 = 1 << 2;
    /// All three error flags (write 1 to clear)
    pub const ERRORS: u32 = READ_LAST_NOT_SET_ERROR | FIFO_ERROR | READ_ERROR;
    pub const OUTSTANDING_WRITES_SHIFT: u32 = 4;
    pub const DMA_ID_SHIFT: u32 = 8;
    pub const DMA_STATE_SHIFT: u32 = 16;
    pub const VERSION_SHIFT: u32 = 25;
    pub const LITE: u32 = 1 << 28;
}

/// Peripheral DREQ line of the PWM
pub const PERMAP_PWM: u32 = 5;

/// Transfer information used for the waveform transfer
pub const TI_CONFIG: u32 = ti_bits::NO_WIDE_BURSTS
    | ti_bits::SRC_INC
    | ti_bits::DEST_DREQ
    | ti_bits::WAIT_RESP
    | ti_bits::INTEN
    | (PERMAP_PWM << ti_bits::PERMAP_SHIFT);

/// Channel priority and write-ordering written alongside ACTIVE
pub const CS_CONFIG: u32 = (8 << cs_bits::PANIC_PRIORITY_SHIFT)
    | (8 << cs_bits::PRIORITY_SHIFT)
    | cs_bits::WAIT_FOR_OUTSTANDING_WRITES;

/// DMA control block
///
/// Layout is fixed by the hardware: eight words, 32-byte aligned.
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlBlock {
    pub info: u32,
    /// Source bus address
    pub source: u32,
    /// Destination bus address
    pub destination: u32,
    /// Transfer length in bytes
    pub length: u32,
    pub stride: u32,
    /// Bus address of the next block, 0 to halt
    pub next: u32,
    pub reserved: [u32; 2],
}

impl ControlBlock {
    /// Size of the block in bytes
    pub const SIZE: usize = 32;

    /// Build the block that moves `led_count` pixels of waveform into the FIFO
    ///
    /// The length is clamped to `capacity_words`; pixels beyond it are never
    /// sent.
    pub fn for_transfer(
        source: u32,
        fifo_bus_addr: u32,
        led_count: usize,
        capacity_words: usize,
    ) -> Self {
        Self {
            info: TI_CONFIG,
            source,
            destination: fifo_bus_addr,
            length: transfer_length(led_count, capacity_words),
            stride: 0,
            next: 0,
            reserved: [0; 2],
        }
    }

    /// The block as the eight words the engine reads
    pub fn to_words(&self) -> [u32; 8] {
        [
            self.info,
            self.source,
            self.destination,
            self.length,
            self.stride,
            self.next,
            self.reserved[0],
            self.reserved[1],
        ]
    }

    /// Number of 32-bit words moved by this block
    pub fn length_words(&self) -> usize {
        self.length as usize / 4
    }
}

/// Transfer length in bytes for `led_count` pixels, clamped to capacity
pub fn transfer_length(led_count: usize, capacity_words: usize) -> u32 {
    let words = waveform::words_for_leds(led_count).min(capacity_words);
    (words * 4) as u32
}

/// DMA channel driver
pub struct DmaChannel {
    regs: RegisterBlock<DmaReg>,
}

impl DmaChannel {
    pub fn new(regs: RegisterBlock<DmaReg>) -> Self {
        Self { regs }
    }

    pub fn read(&self, reg: DmaReg) -> u32 {
        self.regs.read(reg)
    }

    pub fn write(&mut self, reg: DmaReg, value: u32) {
        self.regs.write(reg, value);
    }

    pub fn set_cs(&mut self, mask: u32) {
        self.regs.set_bits(DmaReg::Cs, mask);
    }

    pub fn clear_cs(&mut self, mask: u32) {
        self.regs.clear_bits(DmaReg::Cs, mask);
    }

    pub fn is_active(&self) -> bool {
        self.regs.read(DmaReg::Cs) & cs_bits::ACTIVE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_control_block_layout() {
        assert_eq!(size_of::<ControlBlock>(), ControlBlock::SIZE);
        assert_eq!(align_of::<ControlBlock>(), 32);
    }

    #[test]
    fn test_ti_config_word() {
        assert_eq!(TI_CONFIG, 0x0405_0149);
        assert_eq!(CS_CONFIG, 0x1088_0000);
    }

    #[test]
    fn test_length_words() {
        // ceil(N * 2.25) + 1 words
        for (leds, words) in [(1usize, 4u32), (4, 10), (10, 24), (60, 136)] {
            assert_eq!(transfer_length(leds, 1024), words * 4, "{} leds", leds);
        }
    }

    #[test]
    fn test_length_clamped_to_capacity() {
        let capacity = waveform::words_for_leds(16);
        assert_eq!(transfer_length(16, capacity), (capacity * 4) as u32);
        assert_eq!(transfer_length(17, capacity), (capacity * 4) as u32);
        assert!(transfer_length(15, capacity) < (capacity * 4) as u32);
    }

    #[test]
    fn test_block_fields() {
        let cb = ControlBlock::for_transfer(0x4000_1040, 0x7E20_C018, 2, 64);
        assert_eq!(cb.info, TI_CONFIG);
        assert_eq!(cb.destination, 0x7E20_C018);
        assert_eq!(cb.length, 24);
        assert_eq!(cb.length_words(), 6);
        assert_eq!(cb.next, 0);
        assert_eq!(cb.to_words()[1], 0x4000_1040);
    }
}
