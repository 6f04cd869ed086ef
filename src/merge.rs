//! Reduction of per-tile palettes down to the hardware palette count.
//!
//! The stages run in order:
//!
//! 1. palettes with unused slots are pooled until their combined colours
//!    fill whole palettes;
//! 2. any remaining partial palettes are folded into the full palette that
//!    fits their colours best;
//! 3. full palettes are merged pairwise by lowest merge loss, first inside
//!    sliding windows while the surplus is large, then exhaustively;
//! 4. the survivors get extra quantization trials.

use log::{debug, info, trace};
use rand::Rng;

use crate::color::{Centroid, Color};
use crate::config::QuantizeOptions;
use crate::palette::{Palette, PaletteSet};
use crate::quantize::{self, ColorPool, SLOTS};
use crate::tile::{TILE_PIXELS, TileGrid};

/// Cost given to a palette assembled from leftover colours, so that later
/// passes prefer to merge it and re-quantize it.
pub const POOR_COST: f64 = 9.0;

/// Cost increase from replacing palettes `a` and `b` with one palette,
/// weighted by the number of tiles affected.
#[must_use]
pub fn merge_loss(a: &Palette, b: &Palette) -> f64 {
    let tiles = a.tile_count() + b.tile_count();
    let pixels = (tiles * TILE_PIXELS) as f64;

    let combined = (b.snap_cost(a.pool()) + a.snap_cost(b.pool())) / pixels;
    let previous = (a.cost() + b.cost()) / 2.0;

    (combined - previous) * tiles as f64
}

pub struct MergeEngine<'a, R: Rng + ?Sized> {
    grid: &'a TileGrid,
    options: &'a QuantizeOptions,
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> MergeEngine<'a, R> {
    pub fn new(grid: &'a TileGrid, options: &'a QuantizeOptions, rng: &'a mut R) -> Self {
        Self { grid, options, rng }
    }

    /// Runs every stage and returns the final palettes.
    pub fn run(&mut self) -> PaletteSet {
        let palettes = self.quantize_tiles();
        let (mut full, not_full): (Vec<Palette>, Vec<Palette>) =
            palettes.into_iter().partition(Palette::is_full);

        let not_full = self.premerge(&mut full, not_full);
        self.assign_not_full(&mut full, not_full);
        self.chunked_crunch(&mut full);
        self.standard_crunch(&mut full);
        self.polish(&mut full);

        PaletteSet::new(full)
    }

    /// Quantizes every tile on its own.
    pub fn quantize_tiles(&mut self) -> Vec<Palette> {
        info!("Quantizing {} tiles", self.grid.len());

        (0..self.grid.len())
            .map(|tile| {
                trace!(
                    "Building palette from {} unique colours for tile {}",
                    self.grid.tile(tile).colors().len(),
                    tile
                );
                self.requantize(vec![tile], self.options.trials)
            })
            .collect()
    }

    fn pool(&self, tiles: &[usize]) -> ColorPool {
        ColorPool::from_tiles(tiles.iter().map(|&tile| self.grid.tile(tile)))
    }

    fn requantize(&mut self, tiles: Vec<usize>, trials: usize) -> Palette {
        let pool = self.pool(&tiles);
        let quantization = quantize::quantize(&pool, trials, self.options.loops, &mut *self.rng);
        Palette::new(tiles, pool, quantization)
    }

    /// Pools the colours of partial palettes, in order, until 15 distinct
    /// colours are found; those become the exact centroids of a new full
    /// palette owning every scanned tile. Repeats until enough full
    /// palettes exist. If the partial palettes run out of colours first,
    /// all of them are merged into one palette with a poor cost.
    ///
    /// Returns the partial palettes that were not consumed.
    pub fn premerge(&mut self, full: &mut Vec<Palette>, mut not_full: Vec<Palette>) -> Vec<Palette> {
        while full.len() < self.options.target_palettes && !not_full.is_empty() {
            info!(
                "Pre-merging palettes with empty slots: {} empty, {} full",
                not_full.len(),
                full.len()
            );

            let mut collected: Vec<Color> = Vec::with_capacity(SLOTS);
            let mut consumed = 0;

            'scan: for palette in &not_full {
                consumed += 1;

                for &tile in palette.tiles() {
                    for entry in self.grid.tile(tile).colors() {
                        if !collected.contains(&entry.color) {
                            collected.push(entry.color);

                            if collected.len() == SLOTS {
                                break 'scan;
                            }
                        }
                    }
                }
            }

            let tiles: Vec<usize> = not_full
                .drain(..consumed)
                .flat_map(|palette| palette.tiles().to_vec())
                .collect();
            let pool = self.pool(&tiles);
            let centroids: Vec<Centroid> = collected.iter().map(|&color| color.into()).collect();
            let quantization = quantize::assign(&pool, &centroids);
            let mut palette = Palette::new(tiles, pool, quantization);

            if collected.len() == SLOTS {
                info!("Full palette of colours found, merged {consumed} partial palettes");
            } else {
                debug!(
                    "Ran out of colours to merge, combined the remaining {consumed} partial palettes"
                );
                palette.mark_poor(POOR_COST);
            }

            full.push(palette);
        }

        not_full
    }

    /// Moves each partial palette's tiles into the full palette whose
    /// existing centroids fit them best, re-quantizing the target each time.
    pub fn assign_not_full(&mut self, full: &mut Vec<Palette>, not_full: Vec<Palette>) {
        if !not_full.is_empty() {
            info!(
                "Merging away palettes with empty slots: {} empty, {} full",
                not_full.len(),
                full.len()
            );
        }

        for palette in not_full {
            let mut target = None;
            let mut target_cost = f64::INFINITY;

            for (index, candidate) in full.iter().enumerate() {
                let cost = candidate.snap_cost(palette.pool());

                if cost < target_cost {
                    target_cost = cost;
                    target = Some(index);
                }
            }

            let Some(target) = target else {
                full.push(palette);
                continue;
            };

            debug!("Merging partial palette into {target} and quantizing");
            let mut tiles = full[target].tiles().to_vec();
            tiles.extend_from_slice(palette.tiles());
            full[target] = self.requantize(tiles, self.options.trials);
        }
    }

    /// Merges palettes while the surplus over the window size is large,
    /// only comparing each palette against the ones earlier in the current
    /// window before committing the best merge found there.
    pub fn chunked_crunch(&mut self, palettes: &mut Vec<Palette>) {
        let chunk = self.options.chunk_size.max(2);
        let merges = palettes
            .len()
            .saturating_sub(chunk.max(self.options.target_palettes));

        if merges == 0 {
            return;
        }

        info!("Beginning quick palette crunch: {merges} merges in windows of {chunk}");

        let mut done = 0;
        let mut cursor = 0;
        let mut window_start = 0;
        let mut pending = chunk;
        let mut best: Option<(f64, usize, usize)> = None;

        while done < merges {
            if cursor >= palettes.len() {
                cursor = 0;
                window_start = 0;
            }

            let len = palettes.len();
            let span = (cursor + len - window_start) % len;
            pending -= 1;

            trace!("Comparing palette {} / {}, {} removed", cursor, len - 1, done);

            for offset in 0..span {
                let other = (window_start + offset) % len;
                let loss = merge_loss(&palettes[cursor], &palettes[other]);

                if best.is_none_or(|(best_loss, _, _)| loss < best_loss) {
                    debug!("New best merge found: {cursor} and {other} for {loss}");
                    best = Some((loss, cursor, other));
                }
            }

            if pending == 0 {
                pending = chunk;

                if let Some((_, a, b)) = best.take() {
                    self.merge_pair(palettes, a, b);
                    done += 1;
                    window_start = cursor.min(palettes.len() - 1);
                }
            }

            cursor += 1;
        }
    }

    /// Merges the pair with the lowest loss over all pairs until only the
    /// target number of palettes remains.
    pub fn standard_crunch(&mut self, palettes: &mut Vec<Palette>) {
        if palettes.len() > self.options.target_palettes {
            info!(
                "Beginning standard palette crunch: {} to {}",
                palettes.len(),
                self.options.target_palettes
            );
        }

        while palettes.len() > self.options.target_palettes {
            let mut best: Option<(f64, usize, usize)> = None;

            for i in 0..palettes.len() {
                trace!("Comparing palette {} / {}", i, palettes.len() - 1);

                for j in 0..i {
                    let loss = merge_loss(&palettes[i], &palettes[j]);

                    if best.is_none_or(|(best_loss, _, _)| loss < best_loss) {
                        best = Some((loss, i, j));
                    }
                }
            }

            let Some((loss, i, j)) = best else {
                break;
            };

            debug!("Best merge is {i} and {j} for {loss}");
            self.merge_pair(palettes, i, j);
        }
    }

    /// Replaces the lower-index palette with a re-quantization of both
    /// palettes' tiles and removes the higher one, keeping the order of the
    /// rest.
    fn merge_pair(&mut self, palettes: &mut Vec<Palette>, a: usize, b: usize) {
        let (keep, absorbed) = if a < b { (a, b) } else { (b, a) };
        debug!("Merging {absorbed} into {keep} and quantizing");

        let removed = palettes.remove(absorbed);
        let mut tiles = palettes[keep].tiles().to_vec();
        tiles.extend_from_slice(removed.tiles());
        palettes[keep] = self.requantize(tiles, self.options.trials);
    }

    /// Runs extra quantization trials on every palette, keeping a result
    /// only when it is strictly better.
    pub fn polish(&mut self, palettes: &mut [Palette]) {
        if self.options.extra_trials == 0 {
            return;
        }

        info!(
            "Running extra quantization for {} trials",
            self.options.extra_trials
        );

        for (index, palette) in palettes.iter_mut().enumerate() {
            let candidate = quantize::quantize(
                palette.pool(),
                self.options.extra_trials,
                self.options.loops,
                &mut *self.rng,
            );

            if candidate.cost < palette.cost() {
                info!(
                    "Extra quantization improved palette {index}: {} over {}",
                    candidate.cost,
                    palette.cost()
                );
                palette.replace(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rgb::RGB8;

    use super::*;
    use crate::bitmap::Bitmap;

    fn options(target_palettes: usize) -> QuantizeOptions {
        QuantizeOptions {
            target_palettes,
            ..QuantizeOptions::default()
        }
    }

    /// Tiles laid out left to right, each filled by `paint(tile, x, y)`.
    fn grid(tiles: usize, paint: impl Fn(usize, usize, usize) -> RGB8) -> TileGrid {
        let width = tiles * 8;
        let mut pixels = Vec::with_capacity(width * 8);

        for y in 0..8 {
            for x in 0..width {
                pixels.push(paint(x / 8, x % 8, y));
            }
        }

        TileGrid::from_bitmap(&Bitmap::from_pixels(width, 8, pixels))
    }

    fn busy_grid(tiles: usize) -> TileGrid {
        grid(tiles, |tile, x, y| {
            RGB8::new(
                ((x * 32 + tile * 8) % 256) as u8,
                ((y * 32 + tile * 16) % 256) as u8,
                ((x * y * 8 + tile * 40) % 256) as u8,
            )
        })
    }

    fn two_color_grid(tiles: usize) -> TileGrid {
        grid(tiles, |tile, x, _| {
            if x < 4 {
                RGB8::new((tile * 8) as u8, 0, 0)
            } else {
                RGB8::new(0, (tile * 8) as u8, 255)
            }
        })
    }

    fn total_tiles(palettes: &[Palette]) -> usize {
        palettes.iter().map(Palette::tile_count).sum()
    }

    fn assert_weights_conserved(palettes: &[Palette]) {
        for palette in palettes {
            assert_eq!(
                palette.pixel_weight() as usize,
                palette.tile_count() * TILE_PIXELS
            );
        }
    }

    #[test]
    fn premerge_builds_exact_full_palettes() {
        let grid = two_color_grid(16);
        let options = options(1);
        let mut rng = StdRng::seed_from_u64(1);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let palettes = engine.quantize_tiles();
        assert!(palettes.iter().all(|palette| !palette.is_full()));

        let mut full = Vec::new();
        let rest = engine.premerge(&mut full, palettes);

        assert_eq!(full.len(), 1);
        assert!(full[0].is_full());
        assert!(full[0].cost() >= 0.0);
        assert_eq!(total_tiles(&full) + total_tiles(&rest), 16);
        assert_weights_conserved(&full);
    }

    #[test]
    fn premerge_marks_leftovers_as_poor() {
        // Four tiles sharing the same two colours never reach 15.
        let grid = grid(4, |_, x, _| {
            if x < 4 {
                RGB8::new(0, 0, 0)
            } else {
                RGB8::new(255, 255, 255)
            }
        });
        let options = options(2);
        let mut rng = StdRng::seed_from_u64(1);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let palettes = engine.quantize_tiles();
        let mut full = Vec::new();
        let rest = engine.premerge(&mut full, palettes);

        assert!(rest.is_empty());
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].tile_count(), 4);
        assert_eq!(full[0].slots().len(), 2);
        assert!((full[0].cost() - POOR_COST).abs() < f64::EPSILON);
        assert_weights_conserved(&full);
    }

    #[test]
    fn partial_palettes_join_a_full_palette() {
        let grid = two_color_grid(16);
        let options = options(1);
        let mut rng = StdRng::seed_from_u64(2);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let palettes = engine.quantize_tiles();
        let mut full = Vec::new();
        let rest = engine.premerge(&mut full, palettes);
        let before = full.len();
        engine.assign_not_full(&mut full, rest);

        assert_eq!(full.len(), before);
        assert_eq!(total_tiles(&full), 16);
        assert_weights_conserved(&full);
    }

    #[test]
    fn crunches_remove_one_palette_per_merge() {
        let grid = busy_grid(12);
        let options = QuantizeOptions {
            target_palettes: 3,
            chunk_size: 8,
            loops: 20,
            ..QuantizeOptions::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let mut palettes = engine.quantize_tiles();
        assert!(palettes.iter().all(Palette::is_full));
        assert_eq!(palettes.len(), 12);

        engine.chunked_crunch(&mut palettes);
        assert_eq!(palettes.len(), 8);
        assert_eq!(total_tiles(&palettes), 12);
        assert_weights_conserved(&palettes);

        engine.standard_crunch(&mut palettes);
        assert_eq!(palettes.len(), 3);
        assert_eq!(total_tiles(&palettes), 12);
        assert_weights_conserved(&palettes);
    }

    fn first_tiles(palettes: &[Palette]) -> Vec<usize> {
        palettes.iter().map(|palette| palette.tiles()[0]).collect()
    }

    #[test]
    fn merge_keeps_lower_index_and_order() {
        let grid = busy_grid(10);
        let options = QuantizeOptions {
            target_palettes: 9,
            loops: 20,
            ..QuantizeOptions::default()
        };
        let mut rng = StdRng::seed_from_u64(6);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let mut palettes = engine.quantize_tiles();
        assert_eq!(first_tiles(&palettes), (0..10).collect::<Vec<_>>());

        engine.standard_crunch(&mut palettes);
        assert_eq!(palettes.len(), 9);

        let merged: Vec<usize> = (0..palettes.len())
            .filter(|&i| palettes[i].tile_count() == 2)
            .collect();
        assert_eq!(merged.len(), 1);

        // The survivor sits at its own old index and lists its tile first.
        let keep = merged[0];
        let tiles = palettes[keep].tiles();
        assert_eq!(tiles[0], keep);
        assert!(tiles[1] > keep);

        let absorbed = tiles[1];
        let expected: Vec<usize> = (0..10).filter(|&tile| tile != absorbed).collect();
        assert_eq!(first_tiles(&palettes), expected);
    }

    #[test]
    fn chunked_crunch_preserves_palette_order() {
        let grid = busy_grid(12);
        let options = QuantizeOptions {
            target_palettes: 3,
            chunk_size: 8,
            loops: 20,
            ..QuantizeOptions::default()
        };
        let mut rng = StdRng::seed_from_u64(8);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let mut palettes = engine.quantize_tiles();
        engine.chunked_crunch(&mut palettes);

        let firsts = first_tiles(&palettes);
        assert!(firsts.windows(2).all(|pair| pair[0] < pair[1]));
        for palette in &palettes {
            assert!(palette.tiles()[1..].iter().all(|&tile| tile > palette.tiles()[0]));
        }
    }

    #[test]
    fn polish_never_makes_things_worse() {
        let grid = busy_grid(4);
        let options = options(1);
        let mut rng = StdRng::seed_from_u64(4);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let mut palettes = engine.quantize_tiles();
        engine.standard_crunch(&mut palettes);
        let before = palettes[0].cost();

        engine.polish(&mut palettes);
        assert!(palettes[0].cost() <= before);
        assert_weights_conserved(&palettes);
    }

    #[test]
    fn identical_palettes_merge_for_free() {
        let grid = busy_grid(1);
        let options = options(1);
        let mut rng = StdRng::seed_from_u64(5);
        let mut engine = MergeEngine::new(&grid, &options, &mut rng);

        let palette = engine.quantize_tiles().remove(0);
        let loss = merge_loss(&palette, &palette.clone());
        assert!(loss.abs() < 1e-9);
    }
}
