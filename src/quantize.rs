//! Constrained weighted k-means that reduces a set of colours to at most 15
//! slot colours.
//!
//! Each trial seeds the slots with distinct colours drawn from the pool and
//! then alternates assignment and re-centring. Two heuristics keep it from
//! wasting slots or settling early:
//!
//! - an empty slot is moved onto the colour currently furthest from its
//!   centroid, and assignment is repeated until every slot is in use;
//! - when the cost stalls or keeps rising, the two closest centroids are
//!   merged and the freed slot is moved to the worst-fit colour of the most
//!   populous cluster.

use std::collections::HashMap;

use log::{debug, trace};
use rand::Rng;
use rand::seq::index;

use crate::color::{Centroid, Color, WeightedColor};
use crate::palette::Slot;
use crate::tile::{TILE_PIXELS, Tile};

/// Usable colours per palette. Colour 0 is reserved for transparency.
pub const SLOTS: usize = 15;

const MAX_RESHUFFLES: usize = 6;
const STALL_LIMIT: usize = 2;
const WORSENING_LIMIT: usize = 3;

/// The deduplicated colours of one or more tiles, stored as flat arrays.
#[derive(Clone, Debug, Default)]
pub struct ColorPool {
    colors: Vec<Color>,
    weights: Vec<u32>,
    pixels: u32,
}

impl ColorPool {
    /// Gathers the unique colours of `tiles`, summing weights of colours
    /// shared between tiles. Colours keep their first-seen order.
    pub fn from_tiles<'a, I>(tiles: I) -> Self
    where
        I: IntoIterator<Item = &'a Tile>,
    {
        let mut pool = Self::default();
        let mut positions: HashMap<Color, usize> = HashMap::new();

        for tile in tiles {
            for entry in tile.colors() {
                pool.push(&mut positions, *entry);
            }
            pool.pixels += TILE_PIXELS as u32;
        }

        pool
    }

    /// Builds a pool directly from weighted colours. The pixel total is the
    /// sum of the weights.
    #[must_use]
    pub fn from_weighted(colors: &[WeightedColor]) -> Self {
        let mut pool = Self::default();
        let mut positions: HashMap<Color, usize> = HashMap::new();

        for entry in colors {
            pool.push(&mut positions, *entry);
            pool.pixels += entry.weight;
        }

        pool
    }

    fn push(&mut self, positions: &mut HashMap<Color, usize>, entry: WeightedColor) {
        match positions.get(&entry.color) {
            Some(&position) => self.weights[position] += entry.weight,
            None => {
                positions.insert(entry.color, self.colors.len());
                self.colors.push(entry.color);
                self.weights.push(entry.weight);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[must_use]
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    #[must_use]
    pub fn weights(&self) -> &[u32] {
        &self.weights
    }

    /// Total number of source pixels the pool stands for.
    #[must_use]
    pub fn pixels(&self) -> u32 {
        self.pixels
    }

    /// Sum of each colour's squared distance to its nearest slot, weighted
    /// by pixel count.
    #[must_use]
    pub fn snap_cost(&self, slots: &[Slot]) -> f64 {
        self.colors
            .iter()
            .zip(&self.weights)
            .map(|(&color, &weight)| {
                let nearest = slots
                    .iter()
                    .map(|slot| slot.centroid.distance(color))
                    .fold(f64::INFINITY, f64::min);
                nearest * f64::from(weight)
            })
            .sum()
    }
}

/// The result of quantizing a pool: occupied slots and their cost.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantization {
    pub slots: Vec<Slot>,
    /// Average squared distance per pixel.
    pub cost: f64,
}

/// Quantizes `pool` to at most [`SLOTS`] colours, keeping the best of
/// `trials` independent runs of up to `loops` iterations each.
pub fn quantize<R: Rng + ?Sized>(
    pool: &ColorPool,
    trials: usize,
    loops: usize,
    rng: &mut R,
) -> Quantization {
    if pool.len() <= SLOTS {
        return exact(pool);
    }

    let mut best: Option<Quantization> = None;

    for trial in 0..trials.max(1) {
        let result = Trial::new(pool, rng).run(loops.max(1));
        trace!("Trial {} finished with cost {}", trial, result.cost);

        if best.as_ref().is_none_or(|best| result.cost < best.cost) {
            best = Some(result);
        }
    }

    best.unwrap_or_else(|| exact(pool))
}

/// Gives every colour of a small pool its own slot. The cost is zero.
#[must_use]
pub fn exact(pool: &ColorPool) -> Quantization {
    let slots = pool
        .colors
        .iter()
        .zip(&pool.weights)
        .take(SLOTS)
        .map(|(&color, &weight)| Slot {
            centroid: color.into(),
            weight,
            colors: 1,
        })
        .collect();

    Quantization { slots, cost: 0.0 }
}

/// Assigns every colour of `pool` to the nearest of `centroids` without
/// moving them.
#[must_use]
pub fn assign(pool: &ColorPool, centroids: &[Centroid]) -> Quantization {
    let mut assignment = Assignment::new(pool.len());
    assignment.assign(pool, centroids);

    Quantization {
        slots: assignment.slots(centroids),
        cost: assignment.cost(pool),
    }
}

/// Per-colour nearest slot and distance, plus per-slot totals.
struct Assignment {
    slot: Vec<usize>,
    distance: Vec<f64>,
    weights: [u32; SLOTS],
    counts: [u32; SLOTS],
    total: f64,
}

impl Assignment {
    fn new(len: usize) -> Self {
        Self {
            slot: vec![0; len],
            distance: vec![0.0; len],
            weights: [0; SLOTS],
            counts: [0; SLOTS],
            total: 0.0,
        }
    }

    fn assign(&mut self, pool: &ColorPool, centroids: &[Centroid]) {
        self.weights = [0; SLOTS];
        self.counts = [0; SLOTS];
        self.total = 0.0;

        for (i, (&color, &weight)) in pool.colors.iter().zip(&pool.weights).enumerate() {
            let mut nearest = 0;
            let mut nearest_distance = f64::INFINITY;

            for (slot, centroid) in centroids.iter().enumerate() {
                let distance = centroid.distance(color);

                if distance < nearest_distance {
                    nearest_distance = distance;
                    nearest = slot;
                }
            }

            self.slot[i] = nearest;
            self.distance[i] = nearest_distance;
            self.weights[nearest] += weight;
            self.counts[nearest] += 1;
            self.total += nearest_distance * f64::from(weight);
        }
    }

    fn cost(&self, pool: &ColorPool) -> f64 {
        if pool.pixels == 0 {
            0.0
        } else {
            self.total / f64::from(pool.pixels)
        }
    }

    /// Colour with the largest distance to its centroid. Its distance is
    /// cleared so repeated calls return different colours.
    fn take_farthest(&mut self) -> Option<usize> {
        let mut farthest = None;
        let mut farthest_distance = 0.0;

        for (i, &distance) in self.distance.iter().enumerate() {
            if distance > farthest_distance {
                farthest_distance = distance;
                farthest = Some(i);
            }
        }

        if let Some(i) = farthest {
            self.distance[i] = 0.0;
        }

        farthest
    }

    fn slots(&self, centroids: &[Centroid]) -> Vec<Slot> {
        centroids
            .iter()
            .enumerate()
            .filter(|&(slot, _)| self.weights[slot] > 0)
            .map(|(slot, &centroid)| Slot {
                centroid,
                weight: self.weights[slot],
                colors: self.counts[slot],
            })
            .collect()
    }
}

/// One randomly seeded clustering run.
struct Trial<'a> {
    pool: &'a ColorPool,
    centroids: [Centroid; SLOTS],
    assignment: Assignment,
    iterations: usize,
    reshuffles: usize,
}

impl<'a> Trial<'a> {
    fn new<R: Rng + ?Sized>(pool: &'a ColorPool, rng: &mut R) -> Self {
        let mut centroids = [Centroid::default(); SLOTS];

        for (centroid, i) in centroids.iter_mut().zip(index::sample(rng, pool.len(), SLOTS)) {
            *centroid = pool.colors[i].into();
        }

        Self::with_centroids(pool, centroids)
    }

    fn with_centroids(pool: &'a ColorPool, centroids: [Centroid; SLOTS]) -> Self {
        Self {
            pool,
            centroids,
            assignment: Assignment::new(pool.len()),
            iterations: 0,
            reshuffles: 0,
        }
    }

    fn run(&mut self, loops: usize) -> Quantization {
        let mut best = Quantization {
            slots: Vec::new(),
            cost: f64::INFINITY,
        };

        let mut cost = f64::INFINITY;
        let mut stalled = 0;
        let mut worsening = 0;

        for iteration in 0..loops {
            let previous = cost;
            self.iterations = iteration + 1;

            self.assign_filling_slots();
            cost = self.assignment.cost(self.pool);

            if cost < best.cost {
                best = Quantization {
                    slots: self.assignment.slots(&self.centroids),
                    cost,
                };
            }

            self.recenter();

            if iteration == 0 {
                continue;
            }

            if cost > previous {
                worsening += 1;
            } else {
                worsening = 0;
            }

            if (cost - previous).abs() < f64::EPSILON {
                stalled += 1;
            } else {
                stalled = 0;
            }

            if stalled > STALL_LIMIT || worsening > WORSENING_LIMIT {
                if self.reshuffles == MAX_RESHUFFLES {
                    trace!("Giving up after {MAX_RESHUFFLES} reshuffles at iteration {iteration}");
                    break;
                }

                stalled = 0;
                worsening = 0;
                self.reshuffles += 1;
                self.reshuffle();
            }
        }

        best
    }

    /// Assigns colours to centroids, moving empty slots onto poorly fit
    /// colours until every slot is used.
    fn assign_filling_slots(&mut self) {
        for _ in 0..=self.pool.len() {
            self.assignment.assign(self.pool, &self.centroids);

            let empty: Vec<usize> = (0..SLOTS)
                .filter(|&slot| self.assignment.weights[slot] == 0)
                .collect();

            if empty.is_empty() {
                return;
            }

            for slot in empty {
                match self.assignment.take_farthest() {
                    Some(i) => self.centroids[slot] = self.pool.colors[i].into(),
                    None => return,
                }
            }
        }

        debug!("Could not fill every slot from {} colours", self.pool.len());
        self.assignment.assign(self.pool, &self.centroids);
    }

    /// Moves each occupied centroid to the weighted mean of its colours.
    fn recenter(&mut self) {
        let mut sums = [[0.0f64; 3]; SLOTS];

        for ((&color, &weight), &slot) in self
            .pool
            .colors
            .iter()
            .zip(&self.pool.weights)
            .zip(&self.assignment.slot)
        {
            let weight = f64::from(weight);
            sums[slot][0] += f64::from(color.r) * weight;
            sums[slot][1] += f64::from(color.g) * weight;
            sums[slot][2] += f64::from(color.b) * weight;
        }

        for (slot, sum) in sums.iter().enumerate() {
            let weight = self.assignment.weights[slot];

            if weight > 0 {
                let weight = f64::from(weight);
                self.centroids[slot] = Centroid::new(sum[0] / weight, sum[1] / weight, sum[2] / weight);
            }
        }
    }

    /// Merges the two closest centroids and re-seeds the freed slot from the
    /// worst-fit colour of the cluster holding the most colours.
    fn reshuffle(&mut self) {
        let mut keep = 0;
        let mut freed = 1;
        let mut closest = f64::INFINITY;

        for n in 0..SLOTS {
            for m in 0..n {
                let distance = self.centroids[n].distance_to_centroid(&self.centroids[m]);

                if distance < closest {
                    closest = distance;
                    keep = m;
                    freed = n;
                }
            }
        }

        self.centroids[keep] = self.centroids[keep].midpoint(&self.centroids[freed]);

        let mut populous = 0;
        let mut most_colors = 0;

        for (slot, &count) in self.assignment.counts.iter().enumerate() {
            if count > most_colors {
                most_colors = count;
                populous = slot;
            }
        }

        let mut split = 0;
        let mut split_distance = 0.0;

        for (i, (&slot, &distance)) in self
            .assignment
            .slot
            .iter()
            .zip(&self.assignment.distance)
            .enumerate()
        {
            if slot == populous && distance > split_distance {
                split_distance = distance;
                split = i;
            }
        }

        self.centroids[freed] = self.pool.colors[split].into();
    }
}
