//! Clock manager, PWM clock only
//!
//! Every write to a clock manager register must carry the password `0x5A` in
//! bits 24-31 or the hardware ignores it.

use super::mmio::{Register, RegisterBlock};

/// Clock manager register offsets (PWM clock only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockReg {
    /// PWM clock control
    PwmCtl = 0xA0,
    /// PWM clock divisor
    PwmDiv = 0xA4,
}

impl Register for ClockReg {
    const BLOCK_LEN: usize = crate::board::CLK_LEN;

    fn offset(self) -> usize {
        self as usize
    }
}

/// Clock control register bits
pub mod ctl_bits {
    /// Register write password
    pub const PASSWD: u32 = 0x5A << 24;
    /// Stop and reset the clock generator
    pub const KILL: u32 = 1 << 5;
    /// Enable the clock generator
    pub const ENAB: u32 = 1 << 4;
    /// Clock source field (bits 0-3)
    pub const SRC_MASK: u32 = 0xF;
}

/// Clock divisor register layout
pub mod div_bits {
    /// Integer part, bits 12-23
    pub const DIVI_SHIFT: u32 = 12;
    pub const DIVI_MAX: u32 = 0xFFF;
    /// Fractional part in 1/1024 steps
    pub const DIVF_MAX: u32 = 1023;
}

/// Clock sources selectable in the SRC field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Ground = 0,
    Oscillator = 1,
    PllA = 4,
    PllC = 5,
    PllD = 6,
    HdmiAux = 7,
}

impl ClockSource {
    pub fn from_field(value: u32) -> Option<Self> {
        match value {
            0 => Some(ClockSource::Ground),
            1 => Some(ClockSource::Oscillator),
            4 => Some(ClockSource::PllA),
            5 => Some(ClockSource::PllC),
            6 => Some(ClockSource::PllD),
            7 => Some(ClockSource::HdmiAux),
            _ => None,
        }
    }
}

/// Divisor for the PWM clock: `integer + fraction / 1024`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divisor {
    pub integer: u32,
    pub fraction: u32,
}

impl Divisor {
    /// Divide PLLC down to one serializer bit every 400 ns
    pub const DEFAULT: Self = Self {
        integer: 400,
        fraction: 0,
    };

    /// Value to write into the divisor register, password included
    pub fn register_value(&self) -> u32 {
        ctl_bits::PASSWD
            | ((self.integer & div_bits::DIVI_MAX) << div_bits::DIVI_SHIFT)
            | (self.fraction & div_bits::DIVF_MAX)
    }
}

/// PWM clock generator
pub struct PwmClock {
    regs: RegisterBlock<ClockReg>,
}

impl PwmClock {
    pub fn new(regs: RegisterBlock<ClockReg>) -> Self {
        Self { regs }
    }

    /// Stop the clock generator
    pub fn kill(&mut self) {
        self.regs.write(ClockReg::PwmCtl, ctl_bits::PASSWD | ctl_bits::KILL);
    }

    pub fn set_divisor(&mut self, divisor: Divisor) {
        self.regs.write(ClockReg::PwmDiv, divisor.register_value());
    }

    /// Start the clock generator from `source`
    pub fn enable(&mut self, source: ClockSource) {
        self.regs.write(
            ClockReg::PwmCtl,
            ctl_bits::PASSWD | ctl_bits::ENAB | (source as u32 & ctl_bits::SRC_MASK),
        );
    }

    pub fn control(&self) -> u32 {
        self.regs.read(ClockReg::PwmCtl)
    }

    pub fn divisor(&self) -> u32 {
        self.regs.read(ClockReg::PwmDiv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_divisor_word() {
        assert_eq!(Divisor::DEFAULT.register_value(), 0x5A19_0000);
        let half = Divisor {
            integer: 400,
            fraction: 512,
        };
        assert_eq!(half.register_value(), 0x5A19_0200);
    }

    #[test]
    fn test_enable_pllc() {
        let mut clock = PwmClock::new(RegisterBlock::simulated().unwrap());
        clock.enable(ClockSource::PllC);
        assert_eq!(clock.control(), 0x5A00_0015);
        clock.kill();
        assert_eq!(clock.control(), 0x5A00_0020);
    }

    #[test]
    fn test_source_field() {
        assert_eq!(ClockSource::from_field(5), Some(ClockSource::PllC));
        assert_eq!(ClockSource::from_field(3), None);
    }
}
