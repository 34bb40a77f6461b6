//! Driver configuration
//!
//! Loaded from TOML; every field has a default so a file only needs the
//! settings it changes:
//!
//! ```toml
//! board = "rpi3"
//! led_count = 144
//! brightness = 0.5
//!
//! [timing]
//! divisor_integer = 400
//! ```

use crate::board::{self, Board};
use crate::error::{Error, Result};
use crate::hal::clock::{div_bits, ClockSource, Divisor};
use crate::hal::gpio::pwm0_function;
use crate::mem::ProcPagemap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest strip the driver will size buffers for
pub const MAX_LEDS: usize = 65_536;

/// How brightness is applied on transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessMode {
    /// Scale the pixel buffer itself; values shrink on every transmit
    #[default]
    InPlace,
    /// Scale a copy; the pixel buffer keeps the caller's values
    Scratch,
}

/// Clock and wait timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Clock manager source field (1 = oscillator, 5 = PLLC, 6 = PLLD)
    pub clock_source: u32,
    /// Integer part of the PWM clock divisor
    pub divisor_integer: u32,
    /// Fractional part of the divisor in 1/1024 units
    pub divisor_fraction: u32,
    /// Duration of one serializer bit
    pub bit_time_ns: u32,
    /// Low time after the last bit that latches the LEDs
    pub latch_us: u32,
    /// Settling delay after each register write
    pub settle_us: u32,
    /// Settling delay after enabling PWM DMA requests
    pub dmac_settle_us: u32,
}

impl TimingConfig {
    pub const DEFAULT_SETTLE_US: u32 = 100;
    pub const DEFAULT_DMAC_SETTLE_US: u32 = 1000;

    pub fn clock_source(&self) -> Result<ClockSource> {
        ClockSource::from_field(self.clock_source).ok_or_else(|| {
            Error::validation(format!("unknown clock source {}", self.clock_source))
        })
    }

    pub fn divisor(&self) -> Result<Divisor> {
        if self.divisor_integer == 0 || self.divisor_integer > div_bits::DIVI_MAX {
            return Err(Error::validation(format!(
                "divisor integer {} outside 1..={}",
                self.divisor_integer,
                div_bits::DIVI_MAX
            )));
        }
        if self.divisor_fraction > div_bits::DIVF_MAX {
            return Err(Error::validation(format!(
                "divisor fraction {} exceeds {}",
                self.divisor_fraction,
                div_bits::DIVF_MAX
            )));
        }
        Ok(Divisor {
            integer: self.divisor_integer,
            fraction: self.divisor_fraction,
        })
    }

    /// Time to clock out `bits` serializer bits plus the latch, in microseconds
    pub fn transfer_wait_us(&self, bits: usize) -> u32 {
        let ns = bits as u64 * u64::from(self.bit_time_ns);
        let us = ns.div_ceil(1000) + u64::from(self.latch_us);
        u32::try_from(us).unwrap_or(u32::MAX)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            clock_source: ClockSource::PllC as u32,
            divisor_integer: Divisor::DEFAULT.integer,
            divisor_fraction: Divisor::DEFAULT.fraction,
            bit_time_ns: 400,
            latch_us: 50,
            settle_us: Self::DEFAULT_SETTLE_US,
            dmac_settle_us: Self::DEFAULT_DMAC_SETTLE_US,
        }
    }
}

/// Where hardware access goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Raw physical memory device
    pub device: PathBuf,
    /// Page table export used to resolve DMA buffer frames
    pub pagemap: PathBuf,
    /// Use anonymous memory and fake frames instead of the hardware
    pub simulate: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/mem"),
            pagemap: PathBuf::from(ProcPagemap::SELF_PATH),
            simulate: false,
        }
    }
}

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Board profile name, see [`board::board_names`]
    pub board: String,
    /// Number of LEDs on the strip
    pub led_count: usize,
    /// LEDs the waveform buffer can hold; defaults to `led_count`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    /// Initial brightness in [0, 1]
    pub brightness: f32,
    pub brightness_mode: BrightnessMode,
    /// PWM0 output pin, 12 or 18
    pub gpio_pin: u8,
    pub timing: TimingConfig,
    pub memory: MemoryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            board: "rpi1".to_string(),
            led_count: 60,
            capacity: None,
            brightness: 1.0,
            brightness_mode: BrightnessMode::default(),
            gpio_pin: 18,
            timing: TimingConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Load and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config {
            path: PathBuf::new(),
            message: e.to_string(),
        })
    }

    pub fn with_board(mut self, board: impl Into<String>) -> Self {
        self.board = board.into();
        self
    }

    pub fn with_led_count(mut self, led_count: usize) -> Self {
        self.led_count = led_count;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_brightness(mut self, brightness: f32) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn with_brightness_mode(mut self, mode: BrightnessMode) -> Self {
        self.brightness_mode = mode;
        self
    }

    pub fn with_gpio_pin(mut self, pin: u8) -> Self {
        self.gpio_pin = pin;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn simulated(mut self, simulate: bool) -> Self {
        self.memory.simulate = simulate;
        self
    }

    /// LEDs the waveform buffer is sized for
    pub fn capacity_leds(&self) -> usize {
        self.capacity.unwrap_or(self.led_count)
    }

    pub fn board(&self) -> Result<&'static Board> {
        board::get_board(&self.board).ok_or_else(|| {
            Error::validation(format!(
                "unknown board '{}' (expected one of: {})",
                self.board,
                board::board_names().join(", ")
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.board()?;
        if !(1..=MAX_LEDS).contains(&self.led_count) {
            return Err(Error::validation(format!(
                "led_count {} outside 1..={}",
                self.led_count, MAX_LEDS
            )));
        }
        if !(1..=MAX_LEDS).contains(&self.capacity_leds()) {
            return Err(Error::validation(format!(
                "capacity {} outside 1..={}",
                self.capacity_leds(),
                MAX_LEDS
            )));
        }
        if !(0.0..=1.0).contains(&self.brightness) {
            return Err(Error::validation(format!(
                "brightness {} outside [0, 1]",
                self.brightness
            )));
        }
        if pwm0_function(self.gpio_pin).is_none() {
            return Err(Error::validation(format!(
                "GPIO{} cannot carry PWM0 (use 12 or 18)",
                self.gpio_pin
            )));
        }
        self.timing.clock_source()?;
        self.timing.divisor()?;
        if self.timing.bit_time_ns == 0 {
            return Err(Error::validation("bit_time_ns must be nonzero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = DriverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.capacity_leds(), 60);
        assert_eq!(config.timing.clock_source().unwrap(), ClockSource::PllC);
        assert_eq!(config.timing.divisor().unwrap(), Divisor::DEFAULT);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = write_config(
            r#"
board = "rpi3"
led_count = 8
brightness_mode = "scratch"

[timing]
latch_us = 80
"#,
        );
        let config = DriverConfig::from_file(file.path()).unwrap();
        assert_eq!(config.board().unwrap().id, "rpi3");
        assert_eq!(config.led_count, 8);
        assert_eq!(config.brightness_mode, BrightnessMode::Scratch);
        assert_eq!(config.timing.latch_us, 80);
        assert_eq!(config.timing.bit_time_ns, 400);
        assert_eq!(config.memory.device, PathBuf::from("/dev/mem"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("brightness = 1.5\n");
        assert!(matches!(
            DriverConfig::from_file(file.path()),
            Err(Error::Validation(_))
        ));
        assert!(DriverConfig::default().with_led_count(0).validate().is_err());
        assert!(DriverConfig::default().with_led_count(MAX_LEDS).validate().is_ok());
        assert!(DriverConfig::default().with_led_count(MAX_LEDS + 1).validate().is_err());
        assert!(DriverConfig::default().with_capacity(usize::MAX).validate().is_err());
        assert!(DriverConfig::default().with_gpio_pin(4).validate().is_err());
        assert!(DriverConfig::default().with_board("pi5").validate().is_err());
        let timing = TimingConfig {
            divisor_fraction: 1024,
            ..TimingConfig::default()
        };
        assert!(DriverConfig::default().with_timing(timing).validate().is_err());
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let file = write_config("led_count = \"many\"\n");
        match DriverConfig::from_file(file.path()) {
            Err(Error::Config { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected config error, got {:?}", other),
        }
        assert!(matches!(
            DriverConfig::from_file(Path::new("/nonexistent/ws2812.toml")),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = DriverConfig::default().with_capacity(100).with_brightness(0.25);
        let text = config.to_toml().unwrap();
        let parsed: DriverConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_transfer_wait() {
        let timing = TimingConfig::default();
        // One pixel: 72 bits at 400 ns is 28.8 µs, rounded up, plus the latch
        assert_eq!(timing.transfer_wait_us(72), 29 + 50);
        assert_eq!(timing.transfer_wait_us(0), 50);
    }
}
