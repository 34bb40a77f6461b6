//! WS2812 LED driver for the Raspberry Pi
//!
//! Drives a strip of WS2812 ("NeoPixel") LEDs from Linux userspace without
//! bit-banging. Pixel colors are expanded into a serializer bit stream, placed
//! in locked memory, and streamed to the PWM FIFO by DMA channel 0. The CPU
//! only waits for the transfer to finish.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   encode   ┌────────────────┐   copy   ┌─────────────────┐
//! │ pixel buffer │ ─────────> │ waveform words │ ───────> │ locked DMA page │
//! └──────────────┘            └────────────────┘          └────────┬────────┘
//!                                                                  │ DMA ch0
//!                                                                  v
//!                               GPIO18 / GPIO12  <── PWM1 serializer FIFO
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ws2812_rpi::{Color, DriverConfig, Ws2812};
//!
//! let config = DriverConfig::default().with_board("rpi3").with_led_count(8);
//! let mut strip = Ws2812::new(config)?;
//! strip.fill(Color::new(0, 0, 64));
//! strip.transmit()?;
//! strip.shutdown()?;
//! # Ok::<(), ws2812_rpi::Error>(())
//! ```
//!
//! Hardware access needs root: `/dev/mem` for the registers and
//! `/proc/self/pagemap` for physical frame numbers. Set
//! `memory.simulate = true` to run against anonymous memory instead.

pub mod board;
pub mod config;
pub mod diag;
pub mod driver;
pub mod effects;
pub mod error;
pub mod hal;
pub mod mem;
pub mod pixel;
pub mod sequencer;
pub mod shutdown;
pub mod waveform;

pub use board::{get_board, Board};
pub use config::{BrightnessMode, DriverConfig, MemoryConfig, TimingConfig};
pub use driver::Ws2812;
pub use error::{Error, Result};
pub use pixel::Color;
pub use sequencer::HwState;
