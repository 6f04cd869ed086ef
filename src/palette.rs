//! Palettes built from groups of tiles.

use crate::color::{Centroid, Color};
use crate::quantize::{ColorPool, Quantization, SLOTS};

/// One usable palette entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slot {
    pub centroid: Centroid,
    /// Total pixels assigned to this slot.
    pub weight: u32,
    /// Distinct source colours assigned to this slot.
    pub colors: u32,
}

/// A quantized palette and the tiles that share it.
///
/// Only occupied slots are stored, so a palette with fewer than
/// [`SLOTS`] entries has unused hardware slots.
#[derive(Clone, Debug)]
pub struct Palette {
    slots: Vec<Slot>,
    tiles: Vec<usize>,
    cost: f64,
    pool: ColorPool,
}

impl Palette {
    #[must_use]
    pub fn new(tiles: Vec<usize>, pool: ColorPool, quantization: Quantization) -> Self {
        Self {
            slots: quantization.slots,
            tiles,
            cost: quantization.cost,
            pool,
        }
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Indices of the tiles using this palette, into the tile grid.
    #[must_use]
    pub fn tiles(&self) -> &[usize] {
        &self.tiles
    }

    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Average squared distance per pixel over all owned tiles.
    #[must_use]
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// The deduplicated colours of every owned tile.
    #[must_use]
    pub fn pool(&self) -> &ColorPool {
        &self.pool
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.len() == SLOTS && self.slots.iter().all(|slot| slot.weight > 0)
    }

    /// Sum of pixel weights across all slots.
    #[must_use]
    pub fn pixel_weight(&self) -> u32 {
        self.slots.iter().map(|slot| slot.weight).sum()
    }

    /// Overrides the cost so later passes treat the palette as a poor fit.
    pub fn mark_poor(&mut self, cost: f64) {
        self.cost = cost;
    }

    /// Swaps in a better quantization of the same tiles.
    pub fn replace(&mut self, quantization: Quantization) {
        self.slots = quantization.slots;
        self.cost = quantization.cost;
    }

    /// Index of the slot closest to `color`. Ties go to the lowest index.
    #[must_use]
    pub fn nearest_slot(&self, color: Color) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;

        for (index, slot) in self.slots.iter().enumerate() {
            let distance = slot.centroid.distance(color);

            if distance < best_distance {
                best_distance = distance;
                best = index;
            }
        }

        best
    }

    /// Weighted squared distance of snapping every colour in `pool` onto
    /// this palette's existing centroids.
    #[must_use]
    pub fn snap_cost(&self, pool: &ColorPool) -> f64 {
        pool.snap_cost(&self.slots)
    }

    /// The hardware colours of all 15 slots; unused slots are black.
    #[must_use]
    pub fn colors(&self) -> [Color; SLOTS] {
        let mut colors = [Color::default(); SLOTS];

        for (color, slot) in colors.iter_mut().zip(&self.slots) {
            *color = slot.centroid.to_color();
        }

        colors
    }
}

/// The working collection of palettes at a pipeline stage.
#[derive(Clone, Debug, Default)]
pub struct PaletteSet {
    palettes: Vec<Palette>,
}

impl PaletteSet {
    #[must_use]
    pub fn new(palettes: Vec<Palette>) -> Self {
        Self { palettes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Palette> {
        self.palettes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Palette> {
        self.palettes.iter()
    }

    /// Maps every tile index to the palette that owns it.
    #[must_use]
    pub fn owners(&self, tile_count: usize) -> Vec<Option<usize>> {
        let mut owners = vec![None; tile_count];

        for (index, palette) in self.palettes.iter().enumerate() {
            for &tile in palette.tiles() {
                if let Some(owner) = owners.get_mut(tile) {
                    owner.get_or_insert(index);
                }
            }
        }

        owners
    }
}
