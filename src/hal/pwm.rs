//! PWM peripheral registers
//!
//! Channel 1 is run in serializer mode: each 32-bit FIFO word is shifted out
//! MSB first, one bit per PWM clock tick.

use super::mmio::{Register, RegisterBlock};

/// PWM register offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmReg {
    /// Control
    Ctl = 0x00,
    /// Status
    Sta = 0x04,
    /// DMA configuration
    Dmac = 0x08,
    /// Channel 1 range
    Rng1 = 0x10,
    /// Channel 1 data
    Dat1 = 0x14,
    /// FIFO input
    Fif1 = 0x18,
    /// Channel 2 range
    Rng2 = 0x20,
    /// Channel 2 data
    Dat2 = 0x24,
}

impl Register for PwmReg {
    const BLOCK_LEN: usize = crate::board::PWM_LEN;

    fn offset(self) -> usize {
        self as usize
    }
}

/// CTL register bits (channel 1)
pub mod ctl_bits {
    /// Channel enable
    pub const PWEN1: u32 = 1 << 0;
    /// Serializer mode
    pub const MODE1: u32 = 1 << 1;
    /// Repeat last data when the FIFO runs dry
    pub const RPTL1: u32 = 1 << 2;
    /// Silence bit (idle level)
    pub const SBIT1: u32 = 1 << 3;
    /// Output polarity
    pub const POLA1: u32 = 1 << 4;
    /// Take data from the FIFO instead of DAT1
    pub const USEF1: u32 = 1 << 5;
    /// Clear FIFO (write only)
    pub const CLRF1: u32 = 1 << 6;
    /// Mark/space mode
    pub const MSEN1: u32 = 1 << 7;
}

/// STA register bits
pub mod sta_bits {
    pub const FULL1: u32 = 1 << 0;
    pub const EMPT1: u32 = 1 << 1;
    pub const WERR1: u32 = 1 << 2;
    pub const RERR1: u32 = 1 << 3;
    pub const GAPO1: u32 = 1 << 4;
    pub const BERR: u32 = 1 << 8;
    pub const STA1: u32 = 1 << 9;
}

/// DMAC register layout
pub mod dmac_bits {
    /// DMA enable
    pub const ENAB: u32 = 1 << 31;
    /// Panic threshold, bits 8-15
    pub const PANIC_SHIFT: u32 = 8;
    /// DREQ threshold, bits 0-7
    pub const DREQ_SHIFT: u32 = 0;
    pub const THRESHOLD_MASK: u32 = 0xFF;
}

/// FIFO refill thresholds
pub const DMA_PANIC_THRESHOLD: u32 = 8;
pub const DMA_DREQ_THRESHOLD: u32 = 8;

/// One FIFO word per PWM period
pub const SERIALIZER_RANGE: u32 = 32;

/// PWM channel 1 driver
pub struct Pwm {
    regs: RegisterBlock<PwmReg>,
}

impl Pwm {
    pub fn new(regs: RegisterBlock<PwmReg>) -> Self {
        Self { regs }
    }

    pub fn read(&self, reg: PwmReg) -> u32 {
        self.regs.read(reg)
    }

    pub fn write(&mut self, reg: PwmReg, value: u32) {
        self.regs.write(reg, value);
    }

    pub fn set_ctl(&mut self, mask: u32) {
        self.regs.set_bits(PwmReg::Ctl, mask);
    }

    pub fn clear_ctl(&mut self, mask: u32) {
        self.regs.clear_bits(PwmReg::Ctl, mask);
    }

    /// Enable DMA requests with the given thresholds
    pub fn enable_dma(&mut self, panic: u32, dreq: u32) {
        self.regs.write(
            PwmReg::Dmac,
            dmac_bits::ENAB
                | ((panic & dmac_bits::THRESHOLD_MASK) << dmac_bits::PANIC_SHIFT)
                | ((dreq & dmac_bits::THRESHOLD_MASK) << dmac_bits::DREQ_SHIFT),
        );
    }

    pub fn disable_dma(&mut self) {
        self.regs.clear_bits(PwmReg::Dmac, dmac_bits::ENAB);
    }
}
