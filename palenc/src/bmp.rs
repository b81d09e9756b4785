//! Minimal 24-bit uncompressed bmp reader and writer, the interchange
//! format of the offline tools. Rows are stored bottom to top and padded
//! to four bytes; pixels are B, G, R, which matches our wire order.

use std::fs;
use std::path::Path;

use crate::error::Error;
use crate::raster::{ColorSpace, Image, Pixel};

const FILE_HEADER_LEN: usize = 14;
const INFO_HEADER_LEN: usize = 40;
const PIXEL_DATA_OFFSET: usize = FILE_HEADER_LEN + INFO_HEADER_LEN;

fn row_len(width: usize) -> usize {
    (width * 3 + 3) & !3
}

/// Reads a 24-bit bmp from disk.
pub fn load_bmp(path: impl AsRef<Path>) -> Result<Image, Error> {
    load_bmp_bytes(&fs::read(path)?)
}

/// Parses a 24-bit bmp already in memory. Anything but the plain layout
/// written by [`save_bmp`] is rejected rather than guessed at.
pub fn load_bmp_bytes(bytes: &[u8]) -> Result<Image, Error> {
    if bytes.len() < PIXEL_DATA_OFFSET {
        return Err(Error::BadBmp("shorter than its headers"));
    }
    if &bytes[0..2] != b"BM" {
        return Err(Error::BadBmp("missing BM signature"));
    }
    if read_u32(bytes, 10) as usize != PIXEL_DATA_OFFSET {
        return Err(Error::BadBmp("pixel data must directly follow the headers"));
    }
    let width = read_i32(bytes, 18);
    let height = read_i32(bytes, 22);
    if read_u16(bytes, 28) != 24 {
        return Err(Error::BadBmp("only 24-bit pixels supported"));
    }
    if read_u32(bytes, 30) != 0 {
        return Err(Error::BadBmp("only uncompressed data supported"));
    }
    if width <= 0 || height <= 0 {
        return Err(Error::BadBmp("dimensions must be positive"));
    }
    let width = width as usize;
    let height = height as usize;

    let row_len = row_len(width);
    let data = &bytes[PIXEL_DATA_OFFSET..];
    if data.len() < row_len * height {
        return Err(Error::BadBmp("pixel data truncated"));
    }

    let mut image = Image::new(width, height);
    for row in 0..height {
        let src = &data[(height - 1 - row) * row_len..][..width * 3];
        let dst = &mut image.pixels_mut()[row * width..][..width];
        for (pixel, chunk) in dst.iter_mut().zip(src.chunks_exact(3)) {
            *pixel = Pixel::from_bgr(chunk[0], chunk[1], chunk[2]);
        }
    }
    Ok(image)
}

/// Serializes a BGR raster as a 24-bit bottom-up bmp.
pub fn bmp_bytes(image: &Image) -> Result<Vec<u8>, Error> {
    if image.color_space() != ColorSpace::Bgr {
        return Err(Error::WrongColorSpace {
            expected: ColorSpace::Bgr,
            found: image.color_space(),
        });
    }
    let width = image.width();
    let height = image.height();
    let row_len = row_len(width);
    let file_len = PIXEL_DATA_OFFSET + row_len * height;

    let mut bytes = Vec::with_capacity(file_len);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&(file_len as u32).to_le_bytes());
    bytes.extend_from_slice(&[0; 4]); // reserved
    bytes.extend_from_slice(&(PIXEL_DATA_OFFSET as u32).to_le_bytes());

    bytes.extend_from_slice(&(INFO_HEADER_LEN as u32).to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // planes
    bytes.extend_from_slice(&24u16.to_le_bytes()); // bits per pixel
    bytes.extend_from_slice(&0u32.to_le_bytes()); // compression
    bytes.extend_from_slice(&((row_len * height) as u32).to_le_bytes());
    bytes.extend_from_slice(&[0; 16]); // resolution and color counts

    let padding = [0u8; 3];
    for row in (0..height).rev() {
        for pixel in &image.pixels()[row * width..][..width] {
            bytes.extend_from_slice(&pixel.0);
        }
        bytes.extend_from_slice(&padding[..row_len - width * 3]);
    }
    Ok(bytes)
}

/// Writes a BGR raster to disk as a 24-bit bmp.
pub fn save_bmp(image: &Image, path: impl AsRef<Path>) -> Result<(), Error> {
    fs::write(path, bmp_bytes(image)?)?;
    Ok(())
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    read_u32(bytes, at) as i32
}

#[test]
fn bmp_round_trip_is_lossless() {
    // 3 wide so every row carries padding
    let mut image = Image::new(3, 2);
    for (i, pixel) in image.pixels_mut().iter_mut().enumerate() {
        *pixel = Pixel::from_bgr(i as u8, (i * 40) as u8, (255 - i) as u8);
    }
    let bytes = bmp_bytes(&image).unwrap();
    assert_eq!(bytes.len(), 54 + 2 * 12);
    let back = load_bmp_bytes(&bytes).unwrap();
    assert_eq!(back, image);
}

#[test]
fn unsupported_layouts_are_rejected() {
    let image = Image::new(2, 2);
    let good = bmp_bytes(&image).unwrap();

    let mut bad = good.clone();
    bad[0] = b'X';
    assert!(matches!(
        load_bmp_bytes(&bad),
        Err(Error::BadBmp("missing BM signature"))
    ));

    // 32-bit pixels
    let mut bad = good.clone();
    bad[28] = 32;
    assert!(matches!(load_bmp_bytes(&bad), Err(Error::BadBmp(_))));

    // palette between the headers and the pixels
    let mut bad = good.clone();
    bad[10] = 70;
    assert!(matches!(load_bmp_bytes(&bad), Err(Error::BadBmp(_))));

    // truncated pixel data
    let bad = &good[..good.len() - 1];
    assert!(matches!(load_bmp_bytes(bad), Err(Error::BadBmp(_))));
}

#[test]
fn ycbcr_rasters_cannot_be_dumped() {
    let mut image = Image::new(2, 2);
    image.to_ycbcr();
    assert!(matches!(
        bmp_bytes(&image),
        Err(Error::WrongColorSpace { .. })
    ));
}
