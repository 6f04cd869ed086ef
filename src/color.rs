//! Colour types in the SNES 15-bit colour space.

use rgb::RGB8;

/// Largest value of a single 5-bit channel.
pub const CHANNEL_MAX: u8 = 31;

/// A colour with three 5-bit channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Builds a colour from channels that are already 5-bit.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if a channel exceeds 31.
    #[must_use]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        debug_assert!(r <= CHANNEL_MAX && g <= CHANNEL_MAX && b <= CHANNEL_MAX);
        Self { r, g, b }
    }

    /// Reduces an 8-bit source pixel to 5 bits per channel.
    ///
    /// Only ever applied to 8-bit source data, never to expanded colours.
    #[must_use]
    pub fn from_rgb8(pixel: RGB8) -> Self {
        Self {
            r: pixel.r >> 3,
            g: pixel.g >> 3,
            b: pixel.b >> 3,
        }
    }

    /// Expands the colour back to 8 bits per channel for display.
    #[must_use]
    pub fn to_rgb8(self) -> RGB8 {
        RGB8::new(self.r * 8, self.g * 8, self.b * 8)
    }

    /// Packs the colour as `0bbbbbgggggrrrrr`.
    #[must_use]
    pub fn snes_word(self) -> u16 {
        (u16::from(self.b) << 10) | (u16::from(self.g) << 5) | u16::from(self.r)
    }
}

/// A slot colour during clustering. Weighted means are fractional, so
/// centroids keep full precision until they are encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Centroid {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Centroid {
    #[must_use]
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Squared Euclidean distance to a colour.
    #[must_use]
    pub fn distance(&self, color: Color) -> f64 {
        let dr = self.r - f64::from(color.r);
        let dg = self.g - f64::from(color.g);
        let db = self.b - f64::from(color.b);

        dr * dr + dg * dg + db * db
    }

    /// Squared Euclidean distance between two centroids.
    #[must_use]
    pub fn distance_to_centroid(&self, other: &Centroid) -> f64 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;

        dr * dr + dg * dg + db * db
    }

    #[must_use]
    pub fn midpoint(&self, other: &Centroid) -> Centroid {
        Centroid {
            r: (self.r + other.r) / 2.0,
            g: (self.g + other.g) / 2.0,
            b: (self.b + other.b) / 2.0,
        }
    }

    /// Truncates each channel to an integer 5-bit value, the way the
    /// hardware colour words are produced.
    #[must_use]
    pub fn to_color(&self) -> Color {
        let truncate = |value: f64| value.clamp(0.0, f64::from(CHANNEL_MAX)) as u8;
        Color::new(truncate(self.r), truncate(self.g), truncate(self.b))
    }
}

impl From<Color> for Centroid {
    fn from(color: Color) -> Self {
        Self {
            r: f64::from(color.r),
            g: f64::from(color.g),
            b: f64::from(color.b),
        }
    }
}

/// A unique colour of a tile together with the number of pixels using it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightedColor {
    pub color: Color,
    pub weight: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_is_applied_once() {
        let color = Color::from_rgb8(RGB8::new(255, 128, 7));
        assert_eq!(color, Color::new(31, 16, 0));

        // Expanding and reducing again is stable, so no double shift happens.
        assert_eq!(Color::from_rgb8(color.to_rgb8()), color);
    }

    #[test]
    fn snes_word_layout() {
        assert_eq!(Color::new(31, 0, 0).snes_word(), 0x001F);
        assert_eq!(Color::new(0, 31, 0).snes_word(), 0x03E0);
        assert_eq!(Color::new(0, 0, 31).snes_word(), 0x7C00);
        assert_eq!(Color::new(31, 31, 31).snes_word() & 0x8000, 0);
    }

    #[test]
    fn centroid_truncates() {
        let centroid = Centroid::new(3.99, 0.5, 30.2);
        assert_eq!(centroid.to_color(), Color::new(3, 0, 30));
    }

    #[test]
    fn distances_are_squared() {
        let a = Centroid::from(Color::new(0, 0, 0));
        let b = Color::new(1, 2, 2);
        assert!((a.distance(b) - 9.0).abs() < f64::EPSILON);
        assert!((a.distance_to_centroid(&b.into()) - 9.0).abs() < f64::EPSILON);
    }
}
