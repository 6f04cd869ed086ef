//! SNES 4bpp tile data, tilemap and palette serialization.
//!
//! The binary file holds, in order:
//!
//! - tile data: `output_rows * 32` tiles of 32 bytes, bitplanes 0/1
//!   interleaved per pixel row, followed by bitplanes 2/3;
//! - the tilemap: one little-endian word per cell, `000pppcc cccccccc`
//!   with a 3-bit palette number and a 10-bit character number, rows
//!   padded to 32 cells with `0x03FF`;
//! - the palettes: 16 words each, a transparent entry followed by 15
//!   `0bbbbbgggggrrrrr` colours, padded with empty blocks up to the target
//!   count.

use log::{info, warn};

use crate::error::{Error, Result};
use crate::palette::{Palette, PaletteSet};
use crate::remap::IndexedImage;
use crate::tile::TILE_SIZE;

pub const MAP_COLUMNS: usize = 32;
pub const MAX_OUTPUT_ROWS: usize = 32;
pub const TILE_BYTES: usize = 32;
pub const PALETTE_WORDS: usize = 16;
pub const MAX_PALETTES: usize = 8;

/// Map cell for columns beyond the image width.
pub const EMPTY_MAP_ENTRY: u16 = 0x03FF;

const CHARACTER_MASK: u16 = 0x03FF;

/// Palette number field of a map entry, indexed by palette.
const PALETTE_BITS: [u16; MAX_PALETTES] = [
    0b000 << 10,
    0b001 << 10,
    0b010 << 10,
    0b011 << 10,
    0b100 << 10,
    0b101 << 10,
    0b110 << 10,
    0b111 << 10,
];

/// The three encoded sections of an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    pub tiles: Vec<u8>,
    pub map: Vec<u16>,
    pub palettes: Vec<u16>,
}

impl Encoded {
    /// Concatenates tile data, tilemap and palettes into one file.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(self.tiles.len() + 2 * (self.map.len() + self.palettes.len()));

        bytes.extend_from_slice(&self.tiles);
        for word in self.map.iter().chain(&self.palettes) {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        bytes
    }

    /// Tile data as an assembler include, one `.db` line per tile.
    #[must_use]
    pub fn tile_include(&self, label: &str) -> String {
        let mut text = format!("{label}:\r\n");

        for tile in self.tiles.chunks(TILE_BYTES) {
            let bytes: Vec<String> = tile.iter().map(|byte| format!("${byte:02X}")).collect();
            text.push_str(&format!(".db {}\r\n", bytes.join(", ")));
        }

        text
    }

    /// Tilemap as an assembler include, one `.dw` line per map row.
    #[must_use]
    pub fn map_include(&self, label: &str) -> String {
        words_include(&format!("{label}Map"), &self.map, MAP_COLUMNS)
    }

    /// Palettes as an assembler include, one `.dw` line per palette.
    #[must_use]
    pub fn palette_include(&self, label: &str) -> String {
        words_include(&format!("{label}Palettes"), &self.palettes, PALETTE_WORDS)
    }
}

fn words_include(label: &str, words: &[u16], per_line: usize) -> String {
    let mut text = format!("{label}:\r\n");

    for line in words.chunks(per_line) {
        let words: Vec<String> = line.iter().map(|word| format!("${word:04X}")).collect();
        text.push_str(&format!(".dw {}\r\n", words.join(", ")));
    }

    text
}

/// Encodes a remapped image and its palettes.
///
/// Fails with [`Error::Capacity`] when there are more palettes than the
/// tilemap's 3-bit palette field can address.
pub fn encode(
    image: &IndexedImage,
    palettes: &PaletteSet,
    output_rows: usize,
    target_palettes: usize,
) -> Result<Encoded> {
    if palettes.len() > MAX_PALETTES {
        return Err(Error::Capacity {
            palettes: palettes.len(),
        });
    }

    if output_rows > MAX_OUTPUT_ROWS {
        return Err(Error::InvalidOption(format!(
            "output rows must be at most {MAX_OUTPUT_ROWS}, got {output_rows}"
        )));
    }

    info!(
        "Encoding {} tile rows, {}x{} map and {} palettes",
        output_rows,
        image.tiles_wide(),
        image.tiles_tall(),
        palettes.len()
    );

    Ok(Encoded {
        tiles: encode_tiles(image, output_rows),
        map: encode_map(image)?,
        palettes: encode_palettes(palettes, target_palettes),
    })
}

/// Encodes one tile of colour indices, given in rows of eight.
#[must_use]
pub fn encode_tile(indices: &[[u8; TILE_SIZE]; TILE_SIZE]) -> [u8; TILE_BYTES] {
    let mut bytes = [0u8; TILE_BYTES];

    for (y, row) in indices.iter().enumerate() {
        for (x, &index) in row.iter().enumerate() {
            let bit = 0x80 >> x;

            for plane in 0..4 {
                if index & (1 << plane) != 0 {
                    // Planes 0/1 fill the first half, planes 2/3 the second.
                    let offset = (plane / 2) * 16 + y * 2 + plane % 2;
                    bytes[offset] |= bit;
                }
            }
        }
    }

    bytes
}

fn encode_tiles(image: &IndexedImage, output_rows: usize) -> Vec<u8> {
    let mut tiles = Vec::with_capacity(output_rows * MAP_COLUMNS * TILE_BYTES);

    for tile_y in 0..output_rows {
        for tile_x in 0..MAP_COLUMNS {
            let mut indices = [[0u8; TILE_SIZE]; TILE_SIZE];

            for (y, row) in indices.iter_mut().enumerate() {
                for (x, index) in row.iter_mut().enumerate() {
                    *index = image.index(tile_x * TILE_SIZE + x, tile_y * TILE_SIZE + y);
                }
            }

            tiles.extend_from_slice(&encode_tile(&indices));
        }
    }

    tiles
}

/// Builds a map entry. Tile characters are laid out linearly, 32 per row.
pub fn map_entry(palette: usize, character: usize) -> Result<u16> {
    let bits = PALETTE_BITS
        .get(palette)
        .ok_or(Error::Capacity { palettes: palette + 1 })?;

    Ok(bits | (character as u16 & CHARACTER_MASK))
}

fn encode_map(image: &IndexedImage) -> Result<Vec<u16>> {
    let mut map = Vec::with_capacity(image.tiles_tall() * MAP_COLUMNS);

    for tile_y in 0..image.tiles_tall() {
        for tile_x in 0..image.tiles_wide() {
            map.push(map_entry(
                image.palette_at(tile_x, tile_y),
                tile_y * MAP_COLUMNS + tile_x,
            )?);
        }

        map.resize(map.len() + MAP_COLUMNS.saturating_sub(image.tiles_wide()), EMPTY_MAP_ENTRY);
    }

    Ok(map)
}

fn palette_words(palette: &Palette) -> [u16; PALETTE_WORDS] {
    let mut words = [0u16; PALETTE_WORDS];

    for (word, color) in words[1..].iter_mut().zip(palette.colors()) {
        *word = color.snes_word();
    }

    words
}

fn encode_palettes(palettes: &PaletteSet, target_palettes: usize) -> Vec<u16> {
    let blocks = palettes.len().max(target_palettes);
    let mut words = Vec::with_capacity(blocks * PALETTE_WORDS);

    for palette in palettes.iter() {
        words.extend_from_slice(&palette_words(palette));
    }

    if palettes.len() < target_palettes {
        warn!(
            "Final number of palettes ({}) is less than the target ({}), padding the palette table",
            palettes.len(),
            target_palettes
        );
        words.resize(blocks * PALETTE_WORDS, 0);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_planes_are_interleaved() {
        let mut indices = [[0u8; TILE_SIZE]; TILE_SIZE];
        indices[0][0] = 0b0001;
        indices[0][1] = 0b0010;
        indices[1][7] = 0b0100;
        indices[7][0] = 0b1000;

        let bytes = encode_tile(&indices);
        assert_eq!(bytes[0], 0x80); // plane 0, row 0
        assert_eq!(bytes[1], 0x40); // plane 1, row 0
        assert_eq!(bytes[16 + 2], 0x01); // plane 2, row 1
        assert_eq!(bytes[16 + 15], 0x80); // plane 3, row 7
        assert_eq!(bytes.iter().filter(|&&byte| byte != 0).count(), 4);
    }

    #[test]
    fn solid_index_sets_matching_planes() {
        let bytes = encode_tile(&[[5u8; TILE_SIZE]; TILE_SIZE]);

        for row in 0..TILE_SIZE {
            assert_eq!(bytes[row * 2], 0xFF);
            assert_eq!(bytes[row * 2 + 1], 0x00);
            assert_eq!(bytes[16 + row * 2], 0xFF);
            assert_eq!(bytes[16 + row * 2 + 1], 0x00);
        }
    }

    #[test]
    fn map_entries_pack_palette_and_character() {
        assert_eq!(map_entry(0, 0).unwrap(), 0x0000);
        assert_eq!(map_entry(1, 33).unwrap(), 0x0421);
        assert_eq!(map_entry(7, 1023).unwrap(), 0x1FFF);
        assert!(matches!(map_entry(8, 0), Err(Error::Capacity { palettes: 9 })));
    }

    #[test]
    fn includes_render_hex_lines() {
        let encoded = Encoded {
            tiles: vec![0xAB; TILE_BYTES],
            map: vec![EMPTY_MAP_ENTRY; MAP_COLUMNS],
            palettes: vec![0x7FFF; PALETTE_WORDS],
        };

        let tiles = encoded.tile_include("cover");
        assert!(tiles.starts_with("cover:\r\n.db $AB, $AB"));
        assert_eq!(tiles.lines().count(), 2);

        let map = encoded.map_include("cover");
        assert!(map.starts_with("coverMap:\r\n.dw $03FF, $03FF"));
        assert_eq!(map.matches("$03FF").count(), MAP_COLUMNS);

        let palettes = encoded.palette_include("cover");
        assert!(palettes.starts_with("coverPalettes:\r\n.dw $7FFF"));
        assert!(palettes.ends_with("$7FFF\r\n"));
    }

    #[test]
    fn bytes_are_little_endian() {
        let encoded = Encoded {
            tiles: vec![1, 2],
            map: vec![0x0421],
            palettes: vec![0x7C1F],
        };

        assert_eq!(encoded.to_bytes(), vec![1, 2, 0x21, 0x04, 0x1F, 0x7C]);
    }
}
