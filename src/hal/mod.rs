//! Hardware Abstraction Layer for BCM283x / BCM2711 peripherals
//!
//! Provides register-level drivers for:
//! - DMA channel 0 and its control blocks
//! - PWM channel 1 in serializer mode
//! - PWM clock generator
//! - GPIO function selection

pub mod clock;
pub mod delay;
pub mod dma;
pub mod gpio;
pub mod mmio;
pub mod pwm;

pub use clock::{ClockSource, Divisor, PwmClock};
pub use delay::StdDelay;
pub use dma::{ControlBlock, DmaChannel};
pub use gpio::{Gpio, PinMode};
pub use mmio::{MappedRegion, Register, RegisterBlock, PAGE_SHIFT, PAGE_SIZE};
pub use pwm::Pwm;

use crate::board::Board;
use crate::error::Result;
use log::info;
use std::path::Path;

/// The four register windows the driver needs
pub struct Peripherals {
    pub dma: DmaChannel,
    pub pwm: Pwm,
    pub clock: PwmClock,
    pub gpio: Gpio,
}

impl Peripherals {
    /// Map every block of `board` through the raw memory device
    pub fn map(board: &Board, device: &Path) -> Result<Self> {
        info!(
            "Mapping {} peripherals at 0x{:08x}",
            board.id, board.peripheral_base
        );
        Ok(Self {
            dma: DmaChannel::new(RegisterBlock::map(device, board.dma_base())?),
            pwm: Pwm::new(RegisterBlock::map(device, board.pwm_base())?),
            clock: PwmClock::new(RegisterBlock::map(device, board.clock_base())?),
            gpio: Gpio::new(RegisterBlock::map(device, board.gpio_base())?),
        })
    }

    /// Zeroed stand-in windows for running without hardware
    pub fn simulated() -> Result<Self> {
        Ok(Self {
            dma: DmaChannel::new(RegisterBlock::simulated()?),
            pwm: Pwm::new(RegisterBlock::simulated()?),
            clock: PwmClock::new(RegisterBlock::simulated()?),
            gpio: Gpio::new(RegisterBlock::simulated()?),
        })
    }
}
