//! Palette compression for tiny LCDs.
//!
//! A raw BGR frame goes through three steps on its way to the device:
//! conversion to YCbCr, k-means clustering down to a small palette, and
//! packing into the RGB565-plus-indices format the firmware decodes.
//! Each step is usable on its own; [`pack`] runs the packing step and the
//! binaries wire the full chain together.

mod bmp;
mod color;
mod error;
mod kmeans;
mod pack;
mod raster;

pub use bmp::{bmp_bytes, load_bmp, load_bmp_bytes, save_bmp};
pub use color::{bgr_to_ycbcr, ycbcr_to_bgr};
pub use error::Error;
pub use kmeans::Quantizer;
pub use pack::{bits_per_pixel, pack, pack_into, packed_len, unpack, PackedImage};
pub use raster::{ColorSpace, Image, PaletteImage, Pixel};
