//! Pixel colors

use rgb::RGB8;

/// One LED's color, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale every channel by `brightness`, truncating toward zero
    pub fn scaled(self, brightness: f32) -> Self {
        let scale = |c: u8| (f32::from(c) * brightness) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    /// The 24-bit word in the order the LED shifts it in: green, red, blue
    pub const fn to_grb(self) -> u32 {
        (self.g as u32) << 16 | (self.r as u32) << 8 | self.b as u32
    }
}

impl From<RGB8> for Color {
    fn from(c: RGB8) -> Self {
        Self::new(c.r, c.g, c.b)
    }
}

impl From<Color> for RGB8 {
    fn from(c: Color) -> Self {
        RGB8::new(c.r, c.g, c.b)
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grb_order() {
        assert_eq!(Color::new(0xFF, 0, 0).to_grb(), 0x00FF00);
        assert_eq!(Color::new(0, 0xFF, 0).to_grb(), 0xFF0000);
        assert_eq!(Color::new(0, 0, 0xFF).to_grb(), 0x0000FF);
    }

    #[test]
    fn test_scaled_truncates() {
        assert_eq!(Color::new(255, 101, 1).scaled(0.5), Color::new(127, 50, 0));
        assert_eq!(Color::WHITE.scaled(1.0), Color::WHITE);
        assert_eq!(Color::WHITE.scaled(0.0), Color::BLACK);
    }

    #[test]
    fn test_rgb8_conversion() {
        let c: Color = RGB8::new(1, 2, 3).into();
        assert_eq!(c, Color::new(1, 2, 3));
        assert_eq!(RGB8::from(c), RGB8::new(1, 2, 3));
    }
}
