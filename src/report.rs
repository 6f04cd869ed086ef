use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::info;
use serde_json::{Value, json};

use crate::config::QuantizeOptions;
use crate::error::Result;
use crate::palette::PaletteSet;
use crate::remap::IndexedImage;

/// Summarises a run: input size, seed, options and every final palette.
#[must_use]
pub fn summary(
    image: &IndexedImage,
    palettes: &PaletteSet,
    options: &QuantizeOptions,
    seed: u64,
) -> Value {
    let palettes: Vec<Value> = palettes
        .iter()
        .map(|palette| {
            json!({
                "cost": palette.cost(),
                "tiles": palette.tile_count(),
                "slots_used": palette.slots().len(),
                "colors": palette.colors().iter().map(|color| color.snes_word()).collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "width": image.width(),
        "height": image.height(),
        "seed": seed,
        "options": {
            "trials": options.trials,
            "loops": options.loops,
            "target_palettes": options.target_palettes,
            "chunk_size": options.chunk_size,
            "extra_trials": options.extra_trials,
        },
        "palettes": palettes,
    })
}

pub fn save<P: AsRef<Path>>(path: P, summary: &Value) -> Result<()> {
    info!("Writing report {}", path.as_ref().display());
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;

    Ok(())
}
