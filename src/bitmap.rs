//! Reader for uncompressed 24-bit Windows bitmaps.

use std::fs;
use std::path::Path;

use image::ImageFormat;
use log::{debug, info};
use rgb::RGB8;

use crate::error::{InputError, Result};

const FILE_HEADER_SIZE: usize = 14;
const DIB_HEADER_SIZE: u32 = 40;
const MAX_DIMENSION: i64 = 256;

/// A decoded bitmap. Rows are kept in the file's bottom-up storage order:
/// row 0 is the bottom row of the picture.
#[derive(Clone, Debug)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pixels: Vec<RGB8>,
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl Bitmap {
    /// Builds a bitmap from pixels in bottom-up row order.
    ///
    /// # Panics
    ///
    /// Panics if `pixels` does not hold exactly `width * height` entries.
    #[must_use]
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<RGB8>) -> Self {
        assert_eq!(pixels.len(), width * height, "pixel buffer does not match dimensions");
        Self { width, height, pixels }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        info!("Bytes read: {}", bytes.len());
        Ok(Self::decode(&bytes)?)
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, InputError> {
        if bytes.len() < 2 || &bytes[0..2] != b"BM" {
            return Err(InputError::NotABitmap);
        }

        if bytes.len() < FILE_HEADER_SIZE + DIB_HEADER_SIZE as usize {
            return Err(InputError::TooSmall(bytes.len()));
        }

        let pixel_offset = read_u32(bytes, 10);
        let dib_header_size = read_u32(bytes, 14);
        let width = i64::from(read_i32(bytes, 18));
        let raw_height = i64::from(read_i32(bytes, 22));
        let planes = read_u16(bytes, 26);
        let bits_per_pixel = read_u16(bytes, 28);
        let compression = read_u32(bytes, 30);

        debug!("Pixel start address: {pixel_offset}");
        debug!("Bitmap width: {width}");
        debug!("Bitmap height: {raw_height}");
        debug!("Colour planes: {planes}");
        debug!("Bits per pixel: {bits_per_pixel}");
        debug!("Compression method: {compression}");

        if dib_header_size != DIB_HEADER_SIZE {
            return Err(InputError::UnsupportedHeader(dib_header_size));
        }

        // A negative height marks a top-down bitmap.
        let height = raw_height.abs();

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(InputError::TooLarge { width, height });
        }

        if width <= 0 || height == 0 || width % 8 != 0 || height % 8 != 0 {
            return Err(InputError::BadDimensions { width, height });
        }

        if planes != 1 {
            return Err(InputError::ColorPlanes(planes));
        }

        if bits_per_pixel != 24 {
            return Err(InputError::BitsPerPixel(bits_per_pixel));
        }

        if compression != 0 {
            return Err(InputError::Compressed(compression));
        }

        let width = width as usize;
        let height = height as usize;

        // Rows come back from the codec top-down; storage is bottom-up.
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Bmp)?.into_rgb8();
        let mut pixels = Vec::with_capacity(width * height);

        for row in decoded.rows().rev() {
            pixels.extend(row.map(|pixel| RGB8::new(pixel[0], pixel[1], pixel[2])));
        }

        info!(
            "Bitmap is {}x{} ({}x{} tiles)",
            width,
            height,
            width / 8,
            height / 8
        );

        Ok(Self { width, height, pixels })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at `(x, row)` where `row` counts from the bottom of the picture.
    #[must_use]
    pub fn pixel(&self, x: usize, row: usize) -> RGB8 {
        self.pixels[row * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{Rgb, RgbImage};

    use super::*;

    /// Writes a 24-bit BMP painted in display coordinates.
    fn bmp(width: u32, height: u32, paint: impl Fn(u32, u32) -> Rgb<u8>) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        RgbImage::from_fn(width, height, paint)
            .write_to(&mut bytes, ImageFormat::Bmp)
            .unwrap();
        bytes.into_inner()
    }

    fn solid(width: u32, height: u32) -> Vec<u8> {
        bmp(width, height, |_, _| Rgb([0, 0, 0]))
    }

    #[test]
    fn decodes_rows_bottom_up() {
        let bytes = bmp(16, 8, |x, y| match (x, y) {
            (3, 7) => Rgb([10, 20, 30]),
            (15, 0) => Rgb([255, 0, 128]),
            _ => Rgb([0, 0, 0]),
        });

        let decoded = Bitmap::decode(&bytes).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
        assert_eq!(decoded.pixel(3, 0), RGB8::new(10, 20, 30));
        assert_eq!(decoded.pixel(15, 7), RGB8::new(255, 0, 128));
        assert_eq!(decoded.pixel(0, 0), RGB8::new(0, 0, 0));
    }

    #[test]
    fn top_down_rows_are_normalised() {
        let mut bytes = bmp(8, 8, |x, y| {
            if (x, y) == (0, 0) {
                Rgb([1, 2, 3])
            } else {
                Rgb([0, 0, 0])
            }
        });
        assert_eq!(Bitmap::decode(&bytes).unwrap().pixel(0, 7), RGB8::new(1, 2, 3));

        // Same rows read as top-down: the last file row is now the bottom.
        bytes[22..26].copy_from_slice(&(-8i32).to_le_bytes());
        let decoded = Bitmap::decode(&bytes).unwrap();
        assert_eq!(decoded.height(), 8);
        assert_eq!(decoded.pixel(0, 0), RGB8::new(1, 2, 3));
        assert_eq!(decoded.pixel(0, 7), RGB8::new(0, 0, 0));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = solid(8, 8);
        bytes[0] = b'X';
        assert!(matches!(Bitmap::decode(&bytes), Err(InputError::NotABitmap)));
    }

    #[test]
    fn rejects_unsupported_headers() {
        let bytes = solid(8, 8);

        let mut header = bytes.clone();
        header[14..18].copy_from_slice(&108u32.to_le_bytes());
        assert!(matches!(Bitmap::decode(&header), Err(InputError::UnsupportedHeader(108))));

        let mut planes = bytes.clone();
        planes[26..28].copy_from_slice(&2u16.to_le_bytes());
        assert!(matches!(Bitmap::decode(&planes), Err(InputError::ColorPlanes(2))));

        let mut depth = bytes.clone();
        depth[28..30].copy_from_slice(&32u16.to_le_bytes());
        assert!(matches!(Bitmap::decode(&depth), Err(InputError::BitsPerPixel(32))));

        let mut compressed = bytes;
        compressed[30..34].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(Bitmap::decode(&compressed), Err(InputError::Compressed(1))));
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(matches!(
            Bitmap::decode(&solid(264, 8)),
            Err(InputError::TooLarge { width: 264, .. })
        ));

        assert!(matches!(
            Bitmap::decode(&solid(12, 8)),
            Err(InputError::BadDimensions { width: 12, .. })
        ));
    }

    #[test]
    fn rejects_truncated_files() {
        let bytes = solid(8, 8);
        assert!(matches!(Bitmap::decode(&bytes[..20]), Err(InputError::TooSmall(20))));
        assert!(matches!(
            Bitmap::decode(&bytes[..bytes.len() - 1]),
            Err(InputError::Decode(_))
        ));
    }
}
