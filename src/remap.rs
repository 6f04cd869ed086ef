use log::{info, warn};

use crate::palette::PaletteSet;
use crate::tile::{TILE_PIXELS, TILE_SIZE, TileGrid};

/// The image as palette indices, in display orientation (row 0 is the top
/// of the picture). Index 0 is transparency and never produced for a pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedImage {
    width: usize,
    height: usize,
    tiles_wide: usize,
    tiles_tall: usize,
    indices: Vec<u8>,
    tile_palettes: Vec<usize>,
}

impl IndexedImage {
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
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
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Colour index at `(x, y)`, or 0 outside the image.
    #[must_use]
    pub fn index(&self, x: usize, y: usize) -> u8 {
        if x < self.width && y < self.height {
            self.indices[y * self.width + x]
        } else {
            0
        }
    }

    /// Palette used by the tile at display position `(tile_x, tile_y)`.
    #[must_use]
    pub fn palette_at(&self, tile_x: usize, tile_y: usize) -> usize {
        let row = self.tiles_tall - 1 - tile_y;
        self.tile_palettes[row * self.tiles_wide + tile_x]
    }
}

/// Maps every source pixel to the nearest slot of its tile's palette.
#[must_use]
pub fn remap(grid: &TileGrid, palettes: &PaletteSet) -> IndexedImage {
    info!("Remapping pixels onto {} palettes", palettes.len());

    let width = grid.tiles_wide() * TILE_SIZE;
    let height = grid.tiles_tall() * TILE_SIZE;
    let tile_palettes: Vec<usize> = palettes
        .owners(grid.len())
        .into_iter()
        .enumerate()
        .map(|(tile, owner)| {
            owner.unwrap_or_else(|| {
                warn!("Tile {tile} is not owned by any palette, using palette 0");
                0
            })
        })
        .collect();
    let mut indices = vec![0u8; width * height];

    for (tile, &owner) in grid.iter().zip(&tile_palettes) {
        let Some(palette) = palettes.get(owner) else {
            continue;
        };

        for i in 0..TILE_PIXELS {
            let x = tile.col() * TILE_SIZE + i % TILE_SIZE;
            let row = tile.row() * TILE_SIZE + i / TILE_SIZE;
            let y = height - 1 - row;

            indices[y * width + x] = palette.nearest_slot(tile.pixels()[i]) as u8 + 1;
        }
    }

    IndexedImage {
        width,
        height,
        tiles_wide: grid.tiles_wide(),
        tiles_tall: grid.tiles_tall(),
        indices,
        tile_palettes,
    }
}
