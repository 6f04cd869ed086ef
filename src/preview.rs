use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use log::info;

use crate::error::Result;
use crate::palette::PaletteSet;
use crate::remap::IndexedImage;
use crate::tile::TILE_SIZE;

/// Paints the remapped image with its final palette colours as the
/// hardware would show them.
#[must_use]
pub fn render(image: &IndexedImage, palettes: &PaletteSet) -> RgbImage {
    let palette_colors: Vec<_> = palettes.iter().map(|palette| palette.colors()).collect();

    RgbImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let index = usize::from(image.index(x, y));
        let palette = image.palette_at(x / TILE_SIZE, y / TILE_SIZE);

        match (index.checked_sub(1), palette_colors.get(palette)) {
            (Some(slot), Some(colors)) => {
                let color = colors[slot].to_rgb8();
                Rgb([color.r, color.g, color.b])
            }
            _ => Rgb([0, 0, 0]),
        }
    })
}

pub fn save<P: AsRef<Path>>(path: P, image: &IndexedImage, palettes: &PaletteSet) -> Result<()> {
    info!("Writing preview bitmap {}", path.as_ref().display());
    render(image, palettes).save_with_format(path, ImageFormat::Bmp)?;

    Ok(())
}
