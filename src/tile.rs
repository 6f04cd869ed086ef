//! The 8x8 tile grid and per-tile colour analysis.

use log::trace;

use crate::bitmap::Bitmap;
use crate::color::{Color, WeightedColor};

pub const TILE_SIZE: usize = 8;
pub const TILE_PIXELS: usize = TILE_SIZE * TILE_SIZE;

/// One 8x8 block of downsampled pixels.
#[derive(Clone, Debug)]
pub struct Tile {
    row: usize,
    col: usize,
    pixels: [Color; TILE_PIXELS],
    colors: Vec<WeightedColor>,
}

impl Tile {
    /// Builds a tile from its 64 pixels in raster order and analyses its
    /// colours.
    #[must_use]
    pub fn new(row: usize, col: usize, pixels: [Color; TILE_PIXELS]) -> Self {
        let colors = unique_colors(&pixels);
        Self { row, col, pixels, colors }
    }

    /// Tile row, counted in bitmap storage order (bottom-up).
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn col(&self) -> usize {
        self.col
    }

    #[must_use]
    pub fn pixels(&self) -> &[Color; TILE_PIXELS] {
        &self.pixels
    }

    /// Unique colours in order of first appearance, with pixel counts.
    #[must_use]
    pub fn colors(&self) -> &[WeightedColor] {
        &self.colors
    }
}

/// Deduplicates a tile's pixels into weighted colours, preserving the order
/// in which each colour first appears.
#[must_use]
pub fn unique_colors(pixels: &[Color]) -> Vec<WeightedColor> {
    let mut colors: Vec<WeightedColor> = Vec::with_capacity(pixels.len());

    for &pixel in pixels {
        match colors.iter_mut().find(|entry| entry.color == pixel) {
            Some(entry) => entry.weight += 1,
            None => colors.push(WeightedColor {
                color: pixel,
                weight: 1,
            }),
        }
    }

    colors
}

/// All tiles of a bitmap, addressed by `row * tiles_wide + col`.
#[derive(Clone, Debug)]
pub struct TileGrid {
    tiles_wide: usize,
    tiles_tall: usize,
    tiles: Vec<Tile>,
}

impl TileGrid {
    #[must_use]
    pub fn from_bitmap(bitmap: &Bitmap) -> Self {
        let tiles_wide = bitmap.width() / TILE_SIZE;
        let tiles_tall = bitmap.height() / TILE_SIZE;
        let mut tiles = Vec::with_capacity(tiles_wide * tiles_tall);

        for row in 0..tiles_tall {
            for col in 0..tiles_wide {
                let mut pixels = [Color::default(); TILE_PIXELS];

                for (i, pixel) in pixels.iter_mut().enumerate() {
                    let x = col * TILE_SIZE + i % TILE_SIZE;
                    let y = row * TILE_SIZE + i / TILE_SIZE;
                    *pixel = Color::from_rgb8(bitmap.pixel(x, y));
                }

                let tile = Tile::new(row, col, pixels);
                trace!(
                    "Tile {},{} has {} unique colours",
                    row,
                    col,
                    tile.colors().len()
                );
                tiles.push(tile);
            }
        }

        Self {
            tiles_wide,
            tiles_tall,
            tiles,
        }
    }

    #[must_use]
    pub fn tiles_wide(&self) -> usize {
        self.tiles_wide
    }

    #[must_use]
    pub fn tiles_tall(&self) -> usize {
        self.tiles_tall
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    #[must_use]
    pub fn tile(&self, index: usize) -> &Tile {
        &self.tiles[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }
}
