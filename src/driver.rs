//! WS2812 strip driver
//!
//! Owns the pixel buffer, the locked DMA buffer and the sequenced hardware.
//! The DMA buffer holds the control block followed by the waveform:
//!
//! ```text
//! offset 0    control block (32 bytes)
//! offset 64   waveform samples, capacity words
//! ```

use crate::board::PWM_FIFO_BUS_ADDR;
use crate::config::{BrightnessMode, DriverConfig};
use crate::error::{Error, Result};
use crate::hal::dma::ControlBlock;
use crate::hal::{Peripherals, StdDelay};
use crate::mem::{FrameSource, LockedBuffer, ProcPagemap, SimulatedFrames};
use crate::pixel::Color;
use crate::sequencer::{HwState, Sequencer};
use crate::waveform::{words_for_leds, WaveformBuffer};
use embedded_hal::delay::DelayNs;
use log::{error, info, warn};
use rgb::RGB8;
use smart_leds_trait::SmartLedsWrite;

/// Offset of the control block in the DMA buffer
pub const CONTROL_BLOCK_OFFSET: usize = 0;
/// Offset of the first waveform word in the DMA buffer
pub const SAMPLE_OFFSET: usize = 64;

/// Everything released by shutdown
struct Hardware<D: DelayNs> {
    sequencer: Sequencer<D>,
    buffer: LockedBuffer,
    control_block: ControlBlock,
    cb_bus: u32,
}

/// A strip of WS2812 LEDs on the PWM0 output
pub struct Ws2812<D: DelayNs = StdDelay> {
    config: DriverConfig,
    pixels: Vec<Color>,
    brightness: f32,
    waveform: WaveformBuffer,
    hw: Option<Hardware<D>>,
}

impl Ws2812<StdDelay> {
    /// Map the hardware, allocate the DMA buffer and configure the serializer
    pub fn new(config: DriverConfig) -> Result<Self> {
        Self::with_delay(config, StdDelay)
    }
}

impl<D: DelayNs> Ws2812<D> {
    /// Like [`Ws2812::new`], with a caller-supplied delay source
    pub fn with_delay(config: DriverConfig, delay: D) -> Result<Self> {
        config.validate()?;
        let board = config.board()?;
        let simulate = config.memory.simulate;
        info!(
            "Initializing {} LEDs on {} (GPIO{}{})",
            config.led_count,
            board.id,
            config.gpio_pin,
            if simulate { ", simulated" } else { "" }
        );

        let capacity_words = words_for_leds(config.capacity_leds());
        if config.capacity_leds() < config.led_count {
            warn!(
                "Capacity of {} LEDs is below the strip length {}; the tail will stay dark",
                config.capacity_leds(),
                config.led_count
            );
        }

        let peripherals = if simulate {
            Peripherals::simulated()?
        } else {
            Peripherals::map(board, &config.memory.device)?
        };
        let mut frames: Box<dyn FrameSource> = if simulate {
            Box::new(SimulatedFrames::default())
        } else {
            Box::new(ProcPagemap::open(&config.memory.pagemap)?)
        };

        let pages = LockedBuffer::pages_for(SAMPLE_OFFSET + capacity_words * 4);
        let mut buffer = LockedBuffer::allocate(pages, board, frames.as_mut())?;

        let cb_bus = buffer.bus_address(CONTROL_BLOCK_OFFSET)?;
        let control_block = ControlBlock::for_transfer(
            buffer.bus_address(SAMPLE_OFFSET)?,
            PWM_FIFO_BUS_ADDR,
            config.led_count,
            capacity_words,
        );
        buffer.write_words(CONTROL_BLOCK_OFFSET, &control_block.to_words())?;

        let mut sequencer = Sequencer::new(peripherals, delay);
        if let Err(e) = sequencer.init(config.gpio_pin, &config.timing) {
            sequencer.teardown();
            return Err(e);
        }

        Ok(Self {
            pixels: vec![Color::BLACK; config.led_count],
            brightness: config.brightness,
            waveform: WaveformBuffer::new(capacity_words),
            hw: Some(Hardware {
                sequencer,
                buffer,
                control_block,
                cb_bus,
            }),
            config,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Color] {
        &mut self.pixels
    }

    pub fn pixel(&self, index: usize) -> Option<Color> {
        self.pixels.get(index).copied()
    }

    pub fn set_pixel(&mut self, index: usize, color: Color) -> Result<()> {
        let len = self.pixels.len();
        match self.pixels.get_mut(index) {
            Some(slot) => {
                *slot = color;
                Ok(())
            }
            None => {
                warn!("Pixel {} out of range (strip has {})", index, len);
                Err(Error::validation(format!(
                    "pixel index {} out of range 0..{}",
                    index, len
                )))
            }
        }
    }

    pub fn set_pixel_rgb(&mut self, index: usize, r: u8, g: u8, b: u8) -> Result<()> {
        self.set_pixel(index, Color::new(r, g, b))
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    /// Set every pixel to black; does not transmit
    pub fn clear(&mut self) {
        self.fill(Color::BLACK);
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Set the brightness applied on the next transmit; must be in [0, 1]
    pub fn set_brightness(&mut self, brightness: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&brightness) {
            warn!("Brightness {} rejected, keeping {}", brightness, self.brightness);
            return Err(Error::validation(format!(
                "brightness {} outside [0, 1]",
                brightness
            )));
        }
        self.brightness = brightness;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.hw.is_some()
    }

    pub fn state(&self) -> HwState {
        self.hw
            .as_ref()
            .map_or(HwState::ShutDown, |hw| hw.sequencer.state())
    }

    /// Register blocks, while the hardware is held
    pub fn peripherals(&self) -> Option<&Peripherals> {
        self.hw.as_ref().map(|hw| hw.sequencer.peripherals())
    }

    pub fn control_block(&self) -> Option<&ControlBlock> {
        self.hw.as_ref().map(|hw| &hw.control_block)
    }

    /// Waveform from the most recent transmit
    pub fn waveform(&self) -> &WaveformBuffer {
        &self.waveform
    }

    /// Encode the pixel buffer and send it to the strip
    ///
    /// Blocks until the transfer and latch time have elapsed. Any fatal error
    /// releases the hardware before it is returned.
    pub fn transmit(&mut self) -> Result<()> {
        let Some(hw) = self.hw.as_mut() else {
            return Err(Error::NotInitialized);
        };

        let brightness = match self.config.brightness_mode {
            BrightnessMode::InPlace => {
                for pixel in self.pixels.iter_mut() {
                    *pixel = pixel.scaled(self.brightness);
                }
                1.0
            }
            BrightnessMode::Scratch => self.brightness,
        };
        self.waveform.encode(&self.pixels, brightness);

        let result = send_frame(hw, &self.waveform, &self.config);
        if let Err(e) = &result {
            if e.is_fatal() {
                error!("Transmit failed: {}; releasing hardware", e);
                self.release();
            }
        }
        result
    }

    /// Blank the strip and release the hardware
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.hw.is_none() {
            return Ok(());
        }
        info!("Shutting down");
        self.clear();
        let blank = self.transmit();
        self.release();
        blank
    }

    /// Stop DMA and PWM and release the hardware without blanking
    ///
    /// The LEDs keep showing the last frame.
    pub fn release(&mut self) {
        if let Some(mut hw) = self.hw.take() {
            hw.sequencer.teardown();
        }
    }
}

/// Copy the waveform into the DMA buffer and run one transfer
fn send_frame<D: DelayNs>(
    hw: &mut Hardware<D>,
    waveform: &WaveformBuffer,
    config: &DriverConfig,
) -> Result<()> {
    let cb = hw.control_block;
    let words = cb.length_words();
    let offset = hw.buffer.offset_of(cb.source)?;
    hw.buffer.write_words(offset, &waveform.words()[..words])?;

    hw.sequencer.arm(hw.cb_bus)?;
    hw.sequencer.start(hw.cb_bus)?;
    let wait = config.timing.transfer_wait_us(words * 32);
    hw.sequencer.wait_us(wait);
    hw.sequencer.finish();
    Ok(())
}

impl<D: DelayNs> Drop for Ws2812<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Shutdown failed: {}", e);
        }
    }
}

impl<D: DelayNs> SmartLedsWrite for Ws2812<D> {
    type Error = Error;
    type Color = RGB8;

    /// Fill the pixel buffer from the iterator and transmit
    fn write<T, I>(&mut self, iterator: T) -> Result<()>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        for (slot, item) in self.pixels.iter_mut().zip(iterator) {
            *slot = Color::from(item.into());
        }
        self.transmit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::delay::testing::{RecordingDelay, SharedDelay};
    use crate::hal::dma::DmaReg;

    fn strip(config: DriverConfig) -> Ws2812<RecordingDelay> {
        Ws2812::with_delay(config.simulated(true), RecordingDelay::default()).unwrap()
    }

    fn samples(strip: &Ws2812<RecordingDelay>, count: usize) -> Vec<u32> {
        strip.hw.as_ref().unwrap().buffer.read_words(SAMPLE_OFFSET, count).unwrap()
    }

    #[test]
    fn test_new_writes_control_block() {
        let strip = strip(DriverConfig::default().with_led_count(4));
        let hw = strip.hw.as_ref().unwrap();
        let cb = strip.control_block().unwrap();
        assert_eq!(cb.length, 40);
        assert_eq!(cb.destination, 0x7E20_C018);
        assert_eq!(cb.source, hw.cb_bus + SAMPLE_OFFSET as u32);
        assert_eq!(
            hw.buffer.read_words(CONTROL_BLOCK_OFFSET, 8).unwrap(),
            cb.to_words().to_vec()
        );
        assert_eq!(strip.state(), HwState::PwmConfigured);
    }

    #[test]
    fn test_transmit_copies_waveform() {
        let mut strip = strip(DriverConfig::default().with_led_count(1));
        strip.set_pixel(0, Color::WHITE).unwrap();
        strip.transmit().unwrap();
        assert_eq!(
            samples(&strip, 4),
            vec![0xDB6D_B6DB, 0x6DB6_DB6D, 0xB600_0000, 0]
        );
        assert_eq!(strip.state(), HwState::Idle);
        let hw = strip.peripherals().unwrap();
        assert_eq!(hw.dma.read(DmaReg::ConblkAd), strip.hw.as_ref().unwrap().cb_bus);
    }

    #[test]
    fn test_transmit_waits_for_transfer_and_latch() {
        let mut strip = strip(DriverConfig::default().with_led_count(1));
        strip.transmit().unwrap();
        // 4 words of 32 bits at 400 ns, plus the latch
        let delay = strip.hw.as_ref().unwrap().sequencer.delay();
        assert_eq!(delay.calls_ns.last(), Some(&((52 + 50) * 1000)));
    }

    #[test]
    fn test_in_place_brightness_scales_buffer() {
        let mut strip = strip(DriverConfig::default().with_led_count(2));
        strip.fill(Color::new(200, 100, 50));
        strip.set_brightness(0.5).unwrap();
        strip.transmit().unwrap();
        assert_eq!(strip.pixel(0), Some(Color::new(100, 50, 25)));
        strip.transmit().unwrap();
        assert_eq!(strip.pixel(0), Some(Color::new(50, 25, 12)));
    }

    #[test]
    fn test_scratch_brightness_keeps_buffer() {
        let config = DriverConfig::default()
            .with_led_count(1)
            .with_brightness_mode(BrightnessMode::Scratch);
        let mut strip = strip(config);
        strip.set_pixel(0, Color::WHITE).unwrap();
        strip.set_brightness(0.0).unwrap();
        strip.transmit().unwrap();
        assert_eq!(strip.pixel(0), Some(Color::WHITE));
        assert_eq!(samples(&strip, 3), vec![0x9249_2492, 0x4924_9249, 0x2400_0000]);
    }

    #[test]
    fn test_brightness_validation_keeps_previous() {
        let mut strip = strip(DriverConfig::default());
        strip.set_brightness(0.3).unwrap();
        assert!(matches!(strip.set_brightness(1.5), Err(Error::Validation(_))));
        assert!(strip.set_brightness(-0.1).is_err());
        assert!(strip.set_brightness(f32::NAN).is_err());
        assert_eq!(strip.brightness(), 0.3);
    }

    #[test]
    fn test_pixel_bounds_checked() {
        let mut strip = strip(DriverConfig::default().with_led_count(3));
        assert!(strip.set_pixel_rgb(2, 1, 2, 3).is_ok());
        assert!(matches!(strip.set_pixel_rgb(3, 1, 2, 3), Err(Error::Validation(_))));
        assert_eq!(strip.pixel(2), Some(Color::new(1, 2, 3)));
        assert_eq!(strip.pixel(3), None);
    }

    #[test]
    fn test_capacity_truncates_transfer() {
        let config = DriverConfig::default().with_led_count(10).with_capacity(4);
        let mut strip = strip(config);
        assert_eq!(strip.control_block().unwrap().length, 40);
        strip.fill(Color::WHITE);
        strip.transmit().unwrap();
        assert_eq!(strip.waveform().capacity(), 10);
    }

    #[test]
    fn test_shutdown_blanks_and_releases() {
        let mut strip = strip(DriverConfig::default().with_led_count(1));
        strip.set_pixel(0, Color::WHITE).unwrap();
        strip.shutdown().unwrap();
        assert!(!strip.is_initialized());
        assert_eq!(strip.state(), HwState::ShutDown);
        assert_eq!(strip.pixel(0), Some(Color::BLACK));
        assert_eq!(
            strip.waveform().words()[..3],
            [0x9249_2492, 0x4924_9249, 0x2400_0000]
        );
    }

    #[test]
    fn test_double_shutdown_is_noop() {
        let delay = SharedDelay::default();
        let config = DriverConfig::default().with_led_count(2).simulated(true);
        let mut strip = Ws2812::with_delay(config, delay.clone()).unwrap();
        strip.set_pixel(1, Color::WHITE).unwrap();
        strip.shutdown().unwrap();

        let calls = delay.calls();
        let waveform = strip.waveform().words().to_vec();
        let pixels = strip.pixels().to_vec();

        // Every register write is followed by a settle, so no new delays
        // means the register blocks were not touched again
        strip.shutdown().unwrap();
        assert_eq!(delay.calls(), calls);
        assert_eq!(strip.waveform().words(), waveform.as_slice());
        assert_eq!(strip.pixels(), pixels.as_slice());
        assert_eq!(strip.state(), HwState::ShutDown);
        assert!(strip.peripherals().is_none());

        drop(strip);
        assert_eq!(delay.calls(), calls);
    }

    #[test]
    fn test_release_keeps_pixels() {
        let mut strip = strip(DriverConfig::default().with_led_count(1));
        strip.set_pixel(0, Color::WHITE).unwrap();
        strip.transmit().unwrap();
        strip.release();
        assert_eq!(strip.pixel(0), Some(Color::WHITE));
        assert!(!strip.is_initialized());
        strip.shutdown().unwrap();
    }

    #[test]
    fn test_transmit_after_shutdown_fails() {
        let mut strip = strip(DriverConfig::default());
        strip.shutdown().unwrap();
        assert!(matches!(strip.transmit(), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DriverConfig::default().with_led_count(0).simulated(true);
        assert!(Ws2812::with_delay(config, RecordingDelay::default()).is_err());
    }

    #[test]
    fn test_smart_leds_write() {
        let mut strip = strip(DriverConfig::default().with_led_count(2));
        strip
            .write([RGB8::new(0, 255, 0), RGB8::new(1, 2, 3)].into_iter())
            .unwrap();
        assert_eq!(strip.pixel(1), Some(Color::new(1, 2, 3)));
        assert_eq!(samples(&strip, 1)[0], 0xDB6D_B692);
    }
}
