use thiserror::Error;

/// Problems with the input bitmap. These abort the run before any output
/// is written.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("this is not a bitmap (missing \"BM\" signature)")]
    NotABitmap,

    #[error("input is too small to be a bitmap ({0} bytes)")]
    TooSmall(usize),

    #[error("unsupported DIB header size {0}, only 40-byte Windows headers are supported")]
    UnsupportedHeader(u32),

    #[error("colour planes must equal 1, found {0}")]
    ColorPlanes(u16),

    #[error("bits per pixel must equal 24, found {0}")]
    BitsPerPixel(u16),

    #[error("compressed bitmaps are not supported (compression method {0})")]
    Compressed(u32),

    #[error("bitmap is {width}x{height}, the maximum is 256x256")]
    TooLarge { width: i64, height: i64 },

    #[error("bitmap dimensions {width}x{height} must be non-zero multiples of 8")]
    BadDimensions { width: i64, height: i64 },

    #[error("pixel data could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("{palettes} palettes cannot be addressed by the 3-bit tilemap field (maximum 8)")]
    Capacity { palettes: usize },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write preview image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to write report: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
