use std::io;

use crate::raster::ColorSpace;

/// Everything that can go wrong while building, packing or loading frames.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("palette must have at least one color")]
    EmptyPalette,
    #[error("image has no pixels")]
    EmptyImage,
    #[error("raster is {found_width}x{found_height}, expected {width}x{height}")]
    ShapeMismatch {
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },
    #[error("palette has {found} colors, expected {expected}")]
    PaletteSizeMismatch { expected: usize, found: usize },
    #[error("buffer is {found} bytes, expected {expected}")]
    SizeMismatch { expected: usize, found: usize },
    #[error("palette index {index} out of range for {k} colors")]
    IndexOutOfRange { index: u32, k: usize },
    #[error("expected {expected:?} pixel data, found {found:?}")]
    WrongColorSpace {
        expected: ColorSpace,
        found: ColorSpace,
    },
    #[error("not a supported bmp: {0}")]
    BadBmp(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}
