//! BCM283x GPIO function selection
//!
//! Only the alternate-function routing is needed: the WS2812 data line is
//! driven by the PWM peripheral once the pin is handed over to it.
//!
//! # Pin Assignments
//!
//! | GPIO | Function | PWM channel |
//! |------|----------|-------------|
//! | 12   | ALT0     | PWM0        |
//! | 18   | ALT5     | PWM0        |

use super::mmio::{Register, RegisterBlock};
use crate::error::{Error, Result};

/// GPIO register offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioReg {
    /// Function Select 0 (pins 0-9)
    Gpfsel0 = 0x00,
    /// Function Select 1 (pins 10-19)
    Gpfsel1 = 0x04,
    /// Function Select 2 (pins 20-29)
    Gpfsel2 = 0x08,
    /// Function Select 3 (pins 30-39)
    Gpfsel3 = 0x0C,
    /// Function Select 4 (pins 40-49)
    Gpfsel4 = 0x10,
    /// Function Select 5 (pins 50-53)
    Gpfsel5 = 0x14,
}

impl Register for GpioReg {
    const BLOCK_LEN: usize = crate::board::GPIO_LEN;

    fn offset(self) -> usize {
        self as usize
    }
}

impl GpioReg {
    /// Function select register holding `pin`
    fn fsel_for(pin: u8) -> Self {
        match pin / 10 {
            0 => GpioReg::Gpfsel0,
            1 => GpioReg::Gpfsel1,
            2 => GpioReg::Gpfsel2,
            3 => GpioReg::Gpfsel3,
            4 => GpioReg::Gpfsel4,
            _ => GpioReg::Gpfsel5,
        }
    }
}

/// Pin function, encoded as the 3-bit GPFSEL field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input = 0,
    Output = 1,
    Alt0 = 4,
    Alt1 = 5,
    Alt2 = 6,
    Alt3 = 7,
    Alt4 = 3,
    Alt5 = 2,
}

/// Highest GPIO number on the BCM283x
pub const MAX_PIN: u8 = 53;

/// Function that routes PWM channel 0 to `pin`, if the pin supports it
pub fn pwm0_function(pin: u8) -> Option<PinMode> {
    match pin {
        12 => Some(PinMode::Alt0),
        18 => Some(PinMode::Alt5),
        _ => None,
    }
}

/// GPIO driver over a mapped register block
pub struct Gpio {
    regs: RegisterBlock<GpioReg>,
}

impl Gpio {
    pub fn new(regs: RegisterBlock<GpioReg>) -> Self {
        Self { regs }
    }

    /// Configure a pin's function
    ///
    /// The field is first reset to input, then the requested function is OR'd
    /// in, matching the sequence the BCM2835 datasheet recommends.
    pub fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        if pin > MAX_PIN {
            return Err(Error::validation(format!(
                "GPIO {} does not exist (max {})",
                pin, MAX_PIN
            )));
        }
        let reg = GpioReg::fsel_for(pin);
        let shift = u32::from(pin % 10) * 3;
        self.regs.clear_bits(reg, 0b111 << shift);
        self.regs.set_bits(reg, (mode as u32) << shift);
        Ok(())
    }

    /// Current function of a pin
    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        if pin > MAX_PIN {
            return None;
        }
        let shift = u32::from(pin % 10) * 3;
        let field = (self.regs.read(GpioReg::fsel_for(pin)) >> shift) & 0b111;
        Some(match field {
            0 => PinMode::Input,
            1 => PinMode::Output,
            4 => PinMode::Alt0,
            5 => PinMode::Alt1,
            6 => PinMode::Alt2,
            7 => PinMode::Alt3,
            3 => PinMode::Alt4,
            _ => PinMode::Alt5,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpio() -> Gpio {
        Gpio::new(RegisterBlock::simulated().unwrap())
    }

    #[test]
    fn test_gpio18_alt5() {
        let mut gpio = gpio();
        gpio.set_mode(18, PinMode::Alt5).unwrap();
        // GPIO18 lives in GPFSEL1 bits 24-26
        assert_eq!(gpio.regs.read(GpioReg::Gpfsel1), 0b010 << 24);
        assert_eq!(gpio.mode(18), Some(PinMode::Alt5));
    }

    #[test]
    fn test_set_mode_preserves_neighbours() {
        let mut gpio = gpio();
        gpio.regs.write(GpioReg::Gpfsel1, 0xFFFF_FFFF);
        gpio.set_mode(12, PinMode::Alt0).unwrap();
        let value = gpio.regs.read(GpioReg::Gpfsel1);
        assert_eq!((value >> 6) & 0b111, 0b100);
        assert_eq!(value | (0b111 << 6), 0xFFFF_FFFF);
    }

    #[test]
    fn test_invalid_pin() {
        let mut gpio = gpio();
        assert!(matches!(gpio.set_mode(54, PinMode::Output), Err(Error::Validation(_))));
        assert_eq!(gpio.mode(60), None);
    }

    #[test]
    fn test_pwm0_pins() {
        assert_eq!(pwm0_function(18), Some(PinMode::Alt5));
        assert_eq!(pwm0_function(12), Some(PinMode::Alt0));
        assert_eq!(pwm0_function(4), None);
    }
}
