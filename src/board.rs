//! Raspberry Pi board profiles
//!
//! The ARM-side peripheral base moves between SoC generations, but the
//! offsets of each block inside the peripheral window and the bus addresses
//! seen by the DMA engine do not.

use crate::error::{Error, Result};
use crate::hal::mmio::PAGE_SIZE;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// DMA channel 0 register block, offset from the peripheral base
pub const DMA_OFFSET: u32 = 0x0000_7000;
/// Length of one DMA channel's register block
pub const DMA_LEN: usize = 0x24;

/// PWM register block, offset from the peripheral base
pub const PWM_OFFSET: u32 = 0x0020_C000;
pub const PWM_LEN: usize = 0x28;

/// Clock manager register block, offset from the peripheral base
pub const CLK_OFFSET: u32 = 0x0010_1000;
pub const CLK_LEN: usize = 0xA8;

/// GPIO register block, offset from the peripheral base
pub const GPIO_OFFSET: u32 = 0x0020_0000;
pub const GPIO_LEN: usize = 0xB4;

/// Size of the SDRAM window the DMA engine can address through the bus alias
pub const DMA_ADDRESSABLE: u64 = 0x4000_0000;

/// PWM FIFO as seen from the DMA engine (VideoCore bus address)
pub const PWM_FIFO_BUS_ADDR: u32 = 0x7E20_C000 + 0x18;

/// SoC generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Soc {
    Bcm2835,
    Bcm2836,
    Bcm2837,
    Bcm2711,
}

/// Addresses that differ between board generations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    /// Short identifier (e.g., "rpi1")
    pub id: &'static str,
    pub soc: Soc,
    /// ARM physical address of the peripheral window
    pub peripheral_base: u32,
    /// Bus alias OR'd into SDRAM frame addresses handed to the DMA engine
    pub bus_alias: u32,
}

impl Board {
    pub fn dma_base(&self) -> u32 {
        self.peripheral_base + DMA_OFFSET
    }

    pub fn pwm_base(&self) -> u32 {
        self.peripheral_base + PWM_OFFSET
    }

    pub fn clock_base(&self) -> u32 {
        self.peripheral_base + CLK_OFFSET
    }

    pub fn gpio_base(&self) -> u32 {
        self.peripheral_base + GPIO_OFFSET
    }

    /// Convert a physical frame number into the address the DMA engine uses
    ///
    /// Frames above the first GiB have no bus alias and cannot be reached by
    /// the legacy DMA channels.
    pub fn frame_to_bus(&self, pfn: u64) -> Result<u32> {
        let phys = pfn
            .checked_mul(PAGE_SIZE as u64)
            .filter(|phys| *phys < DMA_ADDRESSABLE)
            .ok_or_else(|| {
                Error::allocation(format!(
                    "frame 0x{:x} lies outside the {} MiB the DMA engine can address",
                    pfn,
                    DMA_ADDRESSABLE >> 20
                ))
            })?;
        Ok(phys as u32 | self.bus_alias)
    }
}

/// Raspberry Pi 1, Zero, Compute Module 1
pub const RPI1: Board = Board {
    id: "rpi1",
    soc: Soc::Bcm2835,
    peripheral_base: 0x2000_0000,
    // L2 cache coherent alias
    bus_alias: 0x4000_0000,
};

/// Raspberry Pi 2
pub const RPI2: Board = Board {
    id: "rpi2",
    soc: Soc::Bcm2836,
    peripheral_base: 0x3F00_0000,
    bus_alias: 0xC000_0000,
};

/// Raspberry Pi 3, Zero 2
pub const RPI3: Board = Board {
    id: "rpi3",
    soc: Soc::Bcm2837,
    peripheral_base: 0x3F00_0000,
    bus_alias: 0xC000_0000,
};

/// Raspberry Pi 4
pub const RPI4: Board = Board {
    id: "rpi4",
    soc: Soc::Bcm2711,
    peripheral_base: 0xFE00_0000,
    bus_alias: 0xC000_0000,
};

/// Registry of built-in board profiles
pub static BOARDS: Lazy<HashMap<&'static str, &'static Board>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("rpi1", &RPI1);
    m.insert("rpi0", &RPI1);
    m.insert("bcm2835", &RPI1);
    m.insert("rpi2", &RPI2);
    m.insert("bcm2836", &RPI2);
    m.insert("rpi3", &RPI3);
    m.insert("bcm2837", &RPI3);
    m.insert("rpi4", &RPI4);
    m.insert("bcm2711", &RPI4);
    m
});

/// Get a board profile by name
pub fn get_board(name: &str) -> Option<&'static Board> {
    BOARDS.get(name.to_lowercase().as_str()).copied()
}

/// Canonical board names
pub fn board_names() -> Vec<&'static str> {
    vec!["rpi1", "rpi2", "rpi3", "rpi4"]
}
