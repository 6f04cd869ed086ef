use std::path::PathBuf;

use clap::Parser;
use log::warn;

use crate::encode::MAX_OUTPUT_ROWS;
use crate::error::{Error, Result};

pub const MIN_CHUNK_SIZE: usize = 8;
pub const MAX_CHUNK_SIZE: usize = 128;

#[derive(Parser, Debug)]
#[command(
    version,
    author = "Jason Lynch <jason@aexoden.com>",
    about = "Quantize a 24bpp bitmap (max 256x256) into SNES tiles, tilemap and palettes",
    after_help = "Image dimensions must be divisible by 8."
)]
pub struct Config {
    /// Base name of the bitmap, without the .bmp extension
    pub name: String,

    /// Number of trials per quantization
    #[arg(short, long, default_value_t = 2)]
    pub trials: usize,

    /// Maximum number of loops per trial
    #[arg(short, long, default_value_t = 60)]
    pub loops: usize,

    /// Target number of palettes (must be <= 8 for SNES output)
    #[arg(short, long, default_value_t = 8)]
    pub palettes: usize,

    /// Palettes compared per window before merging the best pair (8-128)
    #[arg(short, long, default_value_t = 24)]
    pub chunking: usize,

    /// Extra quantization trials for every palette once merging is done
    #[arg(short = 'x', long = "xtra-q", default_value_t = 3)]
    pub extra_trials: usize,

    /// Rows of the tile set to output
    #[arg(short, long, default_value_t = 32)]
    pub output_rows: usize,

    /// Write a single binary file instead of assembler includes
    #[arg(short, long)]
    pub binary_out: bool,

    /// Seed for the random number generator
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Also write a preview bitmap of the result
    #[arg(long)]
    pub preview: bool,

    /// Write a JSON summary of the final palettes to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    #[must_use]
    pub fn input_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.bmp", self.name))
    }

    #[must_use]
    pub fn output_path(&self, suffix: &str, extension: &str) -> PathBuf {
        PathBuf::from(format!("{}{}.{}", self.name, suffix, extension))
    }

    /// Label used for the assembler include files: the file stem of the name.
    #[must_use]
    pub fn label(&self) -> String {
        PathBuf::from(&self.name)
            .file_name()
            .map_or_else(|| self.name.clone(), |name| name.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    pub fn options(&self) -> Result<QuantizeOptions> {
        if self.output_rows == 0 || self.output_rows > MAX_OUTPUT_ROWS {
            return Err(Error::InvalidOption(format!(
                "output rows must be between 1 and {MAX_OUTPUT_ROWS}, got {}",
                self.output_rows
            )));
        }

        QuantizeOptions {
            trials: self.trials,
            loops: self.loops,
            target_palettes: self.palettes,
            chunk_size: self.chunking,
            extra_trials: self.extra_trials,
        }
        .validated()
    }
}

/// Tuning for the quantization and merging passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantizeOptions {
    /// Independent trials per quantization.
    pub trials: usize,
    /// Iteration limit per trial.
    pub loops: usize,
    /// Number of palettes to reduce to.
    pub target_palettes: usize,
    /// Window size for the chunked merge pass.
    pub chunk_size: usize,
    /// Extra trials for each final palette.
    pub extra_trials: usize,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            trials: 2,
            loops: 60,
            target_palettes: 8,
            chunk_size: 24,
            extra_trials: 3,
        }
    }
}

impl QuantizeOptions {
    /// Rejects zero counts and clamps the chunk size into range.
    pub fn validated(mut self) -> Result<Self> {
        if self.trials == 0 {
            return Err(Error::InvalidOption("trials must be at least 1".into()));
        }

        if self.loops == 0 {
            return Err(Error::InvalidOption("loops must be at least 1".into()));
        }

        if self.target_palettes == 0 {
            return Err(Error::InvalidOption("palettes must be at least 1".into()));
        }

        let clamped = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        if clamped != self.chunk_size {
            warn!(
                "Chunk size {} is outside {MIN_CHUNK_SIZE}-{MAX_CHUNK_SIZE}, using {clamped}",
                self.chunk_size
            );
            self.chunk_size = clamped;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_options() {
        let config = Config::parse_from(["snesquant", "cover"]);
        assert_eq!(config.options().unwrap(), QuantizeOptions::default());
        assert!(!config.binary_out);
        assert_eq!(config.output_rows, 32);
        assert_eq!(config.input_path(), PathBuf::from("cover.bmp"));
        assert_eq!(config.output_path("Map", "inc"), PathBuf::from("coverMap.inc"));
    }

    #[test]
    fn chunk_size_is_clamped() {
        let low = Config::parse_from(["snesquant", "cover", "-c", "2"]);
        assert_eq!(low.options().unwrap().chunk_size, MIN_CHUNK_SIZE);

        let high = Config::parse_from(["snesquant", "cover", "--chunking", "500"]);
        assert_eq!(high.options().unwrap().chunk_size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn rejects_zero_counts() {
        let config = Config::parse_from(["snesquant", "cover", "-t", "0"]);
        assert!(matches!(config.options(), Err(Error::InvalidOption(_))));

        let config = Config::parse_from(["snesquant", "cover", "-o", "33"]);
        assert!(matches!(config.options(), Err(Error::InvalidOption(_))));
    }

    #[test]
    fn label_drops_directories() {
        let config = Config::parse_from(["snesquant", "covers/title", "-b", "-vv"]);
        assert_eq!(config.label(), "title");
        assert!(config.binary_out);
        assert_eq!(config.log_level(), log::LevelFilter::Trace);
    }
}
