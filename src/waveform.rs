//! WS2812 waveform encoding
//!
//! The serializer shifts out one bit every 400 ns. Each data bit becomes
//! three serializer bits, so a one is high for 800 ns and a zero for 400 ns
//! within a 1.2 µs slot:
//!
//! ```text
//! 1 => 1 1 0
//! 0 => 1 0 0
//! ```
//!
//! Bits are packed MSB first: serializer bit `p` lands in bit `31 - p % 32`
//! of word `p / 32`, which is the order the PWM FIFO consumes them.

use crate::pixel::Color;
use log::warn;

/// Serializer bits per data bit
pub const SYMBOL_BITS: usize = 3;
/// Data bits per pixel
pub const DATA_BITS: usize = 24;
/// Serializer bits per pixel
pub const BITS_PER_PIXEL: usize = DATA_BITS * SYMBOL_BITS;

const ONE: [bool; SYMBOL_BITS] = [true, true, false];
const ZERO: [bool; SYMBOL_BITS] = [true, false, false];

/// Words needed to send `led_count` pixels, plus one trailing zero word
pub const fn words_for_leds(led_count: usize) -> usize {
    (led_count * BITS_PER_PIXEL).div_ceil(32) + 1
}

/// Fixed-capacity buffer of packed serializer bits
#[derive(Debug, Clone)]
pub struct WaveformBuffer {
    words: Vec<u32>,
}

impl WaveformBuffer {
    /// Zeroed buffer of `capacity_words` words
    pub fn new(capacity_words: usize) -> Self {
        Self {
            words: vec![0; capacity_words],
        }
    }

    /// Buffer large enough for `led_count` pixels
    pub fn for_leds(led_count: usize) -> Self {
        Self::new(words_for_leds(led_count))
    }

    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Pixels that fit in the buffer
    pub fn pixel_capacity(&self) -> usize {
        self.words.len() * 32 / BITS_PER_PIXEL
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Serializer bit at absolute position `p`
    pub fn bit(&self, p: usize) -> bool {
        self.words
            .get(p / 32)
            .is_some_and(|w| w & (1 << (31 - p % 32)) != 0)
    }

    fn set_bit(&mut self, p: usize) {
        self.words[p / 32] |= 1 << (31 - p % 32);
    }

    /// Regenerate the buffer from `pixels`, scaled by `brightness`
    ///
    /// Returns the number of pixels encoded. Pixels past capacity are dropped.
    pub fn encode(&mut self, pixels: &[Color], brightness: f32) -> usize {
        self.words.fill(0);

        let count = pixels.len().min(self.pixel_capacity());
        if count < pixels.len() {
            warn!(
                "Waveform buffer holds {} pixels, dropping {}",
                count,
                pixels.len() - count
            );
        }

        let mut p = 0;
        for pixel in &pixels[..count] {
            let grb = pixel.scaled(brightness).to_grb();
            for i in (0..DATA_BITS).rev() {
                let symbol = if grb & (1 << i) != 0 { ONE } else { ZERO };
                for high in symbol {
                    if high {
                        self.set_bit(p);
                    }
                    p += 1;
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(pixels: &[Color]) -> Vec<u32> {
        let mut buf = WaveformBuffer::for_leds(pixels.len());
        buf.encode(pixels, 1.0);
        buf.words().to_vec()
    }

    #[test]
    fn test_words_for_leds() {
        assert_eq!(words_for_leds(0), 1);
        assert_eq!(words_for_leds(1), 4);
        assert_eq!(words_for_leds(4), 10);
        assert_eq!(words_for_leds(60), 136);
    }

    #[test]
    fn test_all_ones_pattern() {
        assert_eq!(
            encoded(&[Color::WHITE]),
            vec![0xDB6D_B6DB, 0x6DB6_DB6D, 0xB600_0000, 0]
        );
    }

    #[test]
    fn test_all_zeros_pattern() {
        assert_eq!(
            encoded(&[Color::BLACK]),
            vec![0x9249_2492, 0x4924_9249, 0x2400_0000, 0]
        );
    }

    #[test]
    fn test_green_is_sent_first() {
        assert_eq!(
            encoded(&[Color::new(0, 255, 0)]),
            vec![0xDB6D_B692, 0x4924_9249, 0x2400_0000, 0]
        );
        assert_eq!(
            encoded(&[Color::new(255, 0, 0)]),
            vec![0x9249_24DB, 0x6DB6_9249, 0x2400_0000, 0]
        );
        assert_eq!(
            encoded(&[Color::new(0, 0, 255)]),
            vec![0x9249_2492, 0x4924_DB6D, 0xB600_0000, 0]
        );
    }

    #[test]
    fn test_symbols_per_bit() {
        let mut buf = WaveformBuffer::for_leds(1);
        buf.encode(&[Color::new(0, 0x80, 0)], 1.0);
        // Green MSB is one, the next bit is zero
        assert_eq!(
            (0..6).map(|p| buf.bit(p)).collect::<Vec<_>>(),
            vec![true, true, false, true, false, false]
        );
    }

    #[test]
    fn test_brightness_applied_at_encode() {
        let mut dim = WaveformBuffer::for_leds(1);
        dim.encode(&[Color::WHITE], 0.0);
        assert_eq!(dim.words(), encoded(&[Color::BLACK]).as_slice());
    }

    #[test]
    fn test_reencode_clears_previous_frame() {
        let mut buf = WaveformBuffer::for_leds(2);
        buf.encode(&[Color::WHITE, Color::WHITE], 1.0);
        buf.encode(&[Color::BLACK], 1.0);
        assert!(buf.words()[3..].iter().all(|w| *w == 0));
    }

    #[test]
    fn test_truncates_at_capacity() {
        let mut buf = WaveformBuffer::for_leds(2);
        assert_eq!(buf.pixel_capacity(), 2);
        assert_eq!(buf.encode(&[Color::WHITE; 5], 1.0), 2);
    }
}
