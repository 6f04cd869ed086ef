use std::fs;

use anyhow::Context;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub mod bitmap;
pub mod color;
pub mod config;
pub mod encode;
pub mod error;
pub mod merge;
pub mod palette;
pub mod preview;
pub mod quantize;
pub mod remap;
pub mod report;
pub mod tile;
pub mod util;

pub use error::{Error, InputError};

use bitmap::Bitmap;
use config::QuantizeOptions;
use merge::MergeEngine;
use palette::PaletteSet;
use remap::IndexedImage;
use tile::TileGrid;

/// The result of quantizing a bitmap, ready to be encoded.
#[derive(Clone, Debug)]
pub struct Conversion {
    pub grid: TileGrid,
    pub palettes: PaletteSet,
    pub image: IndexedImage,
}

impl Conversion {
    pub fn encode(&self, output_rows: usize, target_palettes: usize) -> error::Result<encode::Encoded> {
        encode::encode(&self.image, &self.palettes, output_rows, target_palettes)
    }
}

/// Runs the whole pipeline on a decoded bitmap: tile analysis, per-tile
/// quantization, palette merging and pixel remapping.
pub fn convert<R: Rng + ?Sized>(bitmap: &Bitmap, options: &QuantizeOptions, rng: &mut R) -> Conversion {
    let grid = TileGrid::from_bitmap(bitmap);
    let palettes = MergeEngine::new(&grid, options, rng).run();
    let image = remap::remap(&grid, &palettes);

    Conversion {
        grid,
        palettes,
        image,
    }
}

pub fn run(config: &config::Config) -> anyhow::Result<()> {
    info!("SNES Image Quantizer");
    info!("Source image: {}", config.name);

    let options = config.options()?;
    let input_path = config.input_path();
    let bitmap = Bitmap::open(&input_path)
        .with_context(|| format!("failed to read {}", input_path.display()))?;

    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    info!("Random seed: {seed}");
    let mut rng = StdRng::seed_from_u64(seed);

    let conversion = convert(&bitmap, &options, &mut rng);
    info!("Reduced to {} palettes", conversion.palettes.len());

    let encoded = conversion.encode(config.output_rows, options.target_palettes)?;

    if config.binary_out {
        let path = config.output_path("", "bin");
        info!("Writing {}", path.display());
        fs::write(&path, encoded.to_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
    } else {
        let label = config.label();

        for (suffix, text) in [
            ("", encoded.tile_include(&label)),
            ("Map", encoded.map_include(&label)),
            ("Palettes", encoded.palette_include(&label)),
        ] {
            let path = config.output_path(suffix, "inc");
            info!("Writing {}", path.display());
            fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        }
    }

    if config.preview {
        let path = config.output_path("Preview", "bmp");
        preview::save(&path, &conversion.image, &conversion.palettes)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if let Some(path) = &config.report {
        let summary = report::summary(&conversion.image, &conversion.palettes, &options, seed);
        report::save(path, &summary).with_context(|| format!("failed to write {}", path.display()))?;
    }

    info!("Done");

    Ok(())
}
