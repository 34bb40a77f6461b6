//! Canned animations
//!
//! Ported from the Adafruit NeoPixel strand test. Every frame checks
//! [`Strip::stop_requested`] so a signal ends the animation within one
//! frame.

use crate::driver::Ws2812;
use crate::error::Result;
use crate::pixel::Color;
use crate::shutdown;
use embedded_hal::delay::DelayNs;

/// What an effect needs from a strip
pub trait Strip {
    fn led_count(&self) -> usize;
    fn set_led(&mut self, index: usize, color: Color);
    fn current_brightness(&self) -> f32;
    fn apply_brightness(&mut self, brightness: f32) -> Result<()>;
    fn show(&mut self) -> Result<()>;

    fn stop_requested(&self) -> bool {
        shutdown::requested()
    }
}

impl<D: DelayNs> Strip for Ws2812<D> {
    fn led_count(&self) -> usize {
        self.len()
    }

    fn set_led(&mut self, index: usize, color: Color) {
        if let Some(slot) = self.pixels_mut().get_mut(index) {
            *slot = color;
        }
    }

    fn current_brightness(&self) -> f32 {
        self.brightness()
    }

    fn apply_brightness(&mut self, brightness: f32) -> Result<()> {
        self.set_brightness(brightness)
    }

    fn show(&mut self) -> Result<()> {
        self.transmit()
    }
}

/// Color wheel: red to green to blue and back, over 0..=255
pub fn wheel(pos: u8) -> Color {
    match pos {
        0..=84 => Color::new(pos * 3, 255 - pos * 3, 0),
        85..=169 => {
            let pos = pos - 85;
            Color::new(255 - pos * 3, 0, pos * 3)
        }
        _ => {
            let pos = pos - 170;
            Color::new(0, pos * 3, 255 - pos * 3)
        }
    }
}

fn frame<S: Strip, D: DelayNs>(strip: &mut S, delay: &mut D, wait_ms: u32) -> Result<bool> {
    strip.show()?;
    delay.delay_ms(wait_ms);
    Ok(!strip.stop_requested())
}

/// Light the pixels one after another
pub fn color_wipe<S: Strip, D: DelayNs>(
    strip: &mut S,
    delay: &mut D,
    color: Color,
    wait_ms: u32,
) -> Result<()> {
    for i in 0..strip.led_count() {
        strip.set_led(i, color);
        if !frame(strip, delay, wait_ms)? {
            break;
        }
    }
    Ok(())
}

/// Shift the whole strip through the wheel
pub fn rainbow<S: Strip, D: DelayNs>(strip: &mut S, delay: &mut D, wait_ms: u32) -> Result<()> {
    for j in 0..256usize {
        for i in 0..strip.led_count() {
            strip.set_led(i, wheel(((i + j) & 255) as u8));
        }
        if !frame(strip, delay, wait_ms)? {
            break;
        }
    }
    Ok(())
}

/// Spread the wheel evenly over the strip and rotate it five times
pub fn rainbow_cycle<S: Strip, D: DelayNs>(
    strip: &mut S,
    delay: &mut D,
    wait_ms: u32,
) -> Result<()> {
    let n = strip.led_count().max(1);
    for j in 0..256 * 5usize {
        for i in 0..strip.led_count() {
            strip.set_led(i, wheel(((i * 256 / n + j) & 255) as u8));
        }
        if !frame(strip, delay, wait_ms)? {
            break;
        }
    }
    Ok(())
}

fn chase<S, D, F>(strip: &mut S, delay: &mut D, cycles: usize, wait_ms: u32, color: F) -> Result<()>
where
    S: Strip,
    D: DelayNs,
    F: Fn(usize, usize) -> Color,
{
    for j in 0..cycles {
        for q in 0..3 {
            for i in (q..strip.led_count()).step_by(3) {
                strip.set_led(i, color(i - q, j));
            }
            let running = frame(strip, delay, wait_ms)?;
            for i in (q..strip.led_count()).step_by(3) {
                strip.set_led(i, Color::BLACK);
            }
            if !running {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Theater marquee: every third pixel lit, crawling
pub fn theater_chase<S: Strip, D: DelayNs>(
    strip: &mut S,
    delay: &mut D,
    color: Color,
    wait_ms: u32,
) -> Result<()> {
    chase(strip, delay, 15, wait_ms, |_, _| color)
}

/// Theater marquee walking through the wheel
pub fn theater_chase_rainbow<S: Strip, D: DelayNs>(
    strip: &mut S,
    delay: &mut D,
    wait_ms: u32,
) -> Result<()> {
    chase(strip, delay, 64, wait_ms, |i, j| wheel(((i + j * 4) % 255) as u8))
}

/// Fade a green/pink gradient up to half brightness and back to black
///
/// The strip's brightness is restored afterwards.
pub fn watermelon_fade<S: Strip, D: DelayNs>(strip: &mut S, delay: &mut D) -> Result<()> {
    let previous = strip.current_brightness();
    let steps = (0..50).chain((0..=50).rev());
    for step in steps {
        strip.apply_brightness(step as f32 / 100.0)?;
        for i in 0..strip.led_count() {
            strip.set_led(i, Color::new((i * 5) as u8, 64, (i * 2) as u8));
        }
        if !frame(strip, delay, 0)? {
            break;
        }
    }
    strip.apply_brightness(previous)
}

/// Blend red and blue between warm white and white over 15 steps
///
/// Green ramps along the strip. Each step takes 100 frames.
pub fn color_fade<S: Strip, D: DelayNs>(strip: &mut S, delay: &mut D) -> Result<()> {
    let n = strip.led_count();
    if n == 0 {
        return Ok(());
    }
    let green_step = 255 / n;
    let (mut last_r, mut last_b) = (0.0f32, 0.0f32);
    for j in 1..16 {
        let (r, b) = if j % 3 != 0 { (120.0, 48.0) } else { (255.0, 255.0) };
        for step in 0..100 {
            let k = step as f32 / 100.0;
            let red = (r * k + last_r * (1.0 - k)) as u8;
            let blue = (b * k + last_b * (1.0 - k)) as u8;
            for i in 0..n {
                strip.set_led(i, Color::new(red, (i * green_step) as u8, blue));
            }
            if !frame(strip, delay, 0)? {
                return Ok(());
            }
        }
        last_r = r;
        last_b = b;
    }
    Ok(())
}

/// Run every effect once, stopping early if shutdown is requested
pub fn demo<S: Strip, D: DelayNs>(strip: &mut S, delay: &mut D) -> Result<()> {
    color_wipe(strip, delay, Color::new(255, 0, 0), 50)?;
    color_wipe(strip, delay, Color::new(0, 255, 0), 50)?;
    color_wipe(strip, delay, Color::new(0, 0, 255), 50)?;
    theater_chase(strip, delay, Color::new(127, 127, 127), 50)?;
    theater_chase(strip, delay, Color::new(127, 0, 0), 50)?;
    theater_chase(strip, delay, Color::new(0, 0, 127), 50)?;
    rainbow(strip, delay, 5)?;
    rainbow_cycle(strip, delay, 5)?;
    theater_chase_rainbow(strip, delay, 50)?;
    watermelon_fade(strip, delay)?;
    color_fade(strip, delay)
}
