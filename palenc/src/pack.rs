//! The frame layout the screen firmware decodes: `k` RGB565 palette words,
//! little endian, then every pixel's palette index packed LSB-first at
//! `bits_per_pixel(k)` bits, row-major, with the dead bits of the final
//! byte zeroed.

use bitvec::prelude::*;

use crate::error::Error;
use crate::raster::{ColorSpace, PaletteImage, Pixel};

/// Bits used per packed palette index: the bit length of `k - 1`, so a
/// single-color palette needs no index bits at all.
pub fn bits_per_pixel(k: usize) -> Result<u32, Error> {
    if k == 0 {
        return Err(Error::EmptyPalette);
    }
    Ok(usize::BITS - (k - 1).leading_zeros())
}

/// Exact byte length of a packed frame.
pub fn packed_len(k: usize, width: usize, height: usize) -> Result<usize, Error> {
    let bits = bits_per_pixel(k)? as usize;
    Ok(2 * k + (width * height * bits + 7) / 8)
}

/// A fully packed frame, always sized exactly for its palette and shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedImage {
    pub(crate) k: usize,
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) bytes: Vec<u8>,
}

impl PackedImage {
    /// A zeroed buffer of exactly [`packed_len`] bytes.
    pub fn new(k: usize, width: usize, height: usize) -> Result<Self, Error> {
        let len = packed_len(k, width, height)?;
        Ok(Self {
            k,
            width,
            height,
            bytes: vec![0; len],
        })
    }

    /// Wraps bytes received off the wire, validating the length for the
    /// claimed palette and shape.
    pub fn from_bytes(
        k: usize,
        width: usize,
        height: usize,
        bytes: Vec<u8>,
    ) -> Result<Self, Error> {
        let expected = packed_len(k, width, height)?;
        if bytes.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                found: bytes.len(),
            });
        }
        Ok(Self {
            k,
            width,
            height,
            bytes,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Packs a quantized frame into `dst`. The palette must already be BGR;
/// shapes and palette sizes must agree.
pub fn pack_into(src: &PaletteImage, dst: &mut PackedImage) -> Result<(), Error> {
    if src.color_space() != ColorSpace::Bgr {
        return Err(Error::WrongColorSpace {
            expected: ColorSpace::Bgr,
            found: src.color_space(),
        });
    }
    if dst.k != src.k() {
        return Err(Error::PaletteSizeMismatch {
            expected: dst.k,
            found: src.k(),
        });
    }
    if dst.width != src.width() || dst.height != src.height() {
        return Err(Error::ShapeMismatch {
            width: dst.width,
            height: dst.height,
            found_width: src.width(),
            found_height: src.height(),
        });
    }

    let k = src.k();
    let bits = bits_per_pixel(k)? as usize;

    let mut packed = BitVec::<u8, Lsb0>::with_capacity(dst.bytes.len() * 8);
    for color in src.palette() {
        let (b, g, r) = color.bgr();
        let word = ((b as u16) >> 3) | (((g as u16) >> 2) << 5) | (((r as u16) >> 3) << 11);
        packed.extend_from_raw_slice(&word.to_le_bytes());
    }
    for &index in src.indices() {
        if index as usize >= k {
            return Err(Error::IndexOutOfRange { index, k });
        }
        packed.extend_from_bitslice(&index.view_bits::<Lsb0>()[..bits]);
    }
    packed.set_uninitialized(false);
    dst.bytes.copy_from_slice(packed.as_raw_slice());
    Ok(())
}

/// Packs into a freshly allocated buffer.
pub fn pack(src: &PaletteImage) -> Result<PackedImage, Error> {
    let mut dst = PackedImage::new(src.k(), src.width(), src.height())?;
    pack_into(src, &mut dst)?;
    Ok(dst)
}

/// Rebuilds a palette image from a packed frame. Indices come back exact;
/// palette colors come back in BGR with the low bits lost to RGB565.
pub fn unpack(src: &PackedImage) -> Result<PaletteImage, Error> {
    let mut out = PaletteImage::new(src.k, src.width, src.height)?;
    out.color_space = ColorSpace::Bgr;

    for (entry, word) in out
        .palette
        .iter_mut()
        .zip(src.bytes[..2 * src.k].chunks_exact(2))
    {
        let word = u16::from_le_bytes([word[0], word[1]]);
        let b = ((word & 0x1f) << 3) as u8;
        let g = (((word >> 5) & 0x3f) << 2) as u8;
        let r = (((word >> 11) & 0x1f) << 3) as u8;
        *entry = Pixel::from_bgr(b, g, r);
    }

    let bits = bits_per_pixel(src.k)? as usize;
    if bits > 0 {
        let stream = src.bytes[2 * src.k..].view_bits::<Lsb0>();
        for (slot, chunk) in out.indices.iter_mut().zip(stream.chunks_exact(bits)) {
            *slot = chunk.load_le::<u32>();
        }
    }
    Ok(out)
}

#[cfg(test)]
fn bgr_palette_image(k: usize, width: usize, height: usize) -> PaletteImage {
    let mut image = PaletteImage::new(k, width, height).unwrap();
    image.color_space = ColorSpace::Bgr;
    image
}

#[test]
fn index_width_tracks_palette_size() {
    for (k, bits) in [
        (1, 0),
        (2, 1),
        (3, 2),
        (4, 2),
        (5, 3),
        (16, 4),
        (17, 5),
        (32, 5),
        (33, 6),
        (256, 8),
    ] {
        assert_eq!(bits_per_pixel(k).unwrap(), bits);
    }
    assert!(matches!(bits_per_pixel(0), Err(Error::EmptyPalette)));
}

#[test]
fn packed_sizes_match_the_device_format() {
    // the production shape: 32 colors over 160x80 at 5 bits per pixel
    assert_eq!(packed_len(32, 160, 80).unwrap(), 8064);
    assert_eq!(packed_len(1, 4, 4).unwrap(), 2);
    assert_eq!(packed_len(2, 4, 4).unwrap(), 6);
}

#[test]
fn layout_is_lsb_first() {
    let mut image = bgr_palette_image(2, 4, 1);
    image.palette[0] = Pixel::from_bgr(8, 4, 8);
    image.palette[1] = Pixel::from_bgr(255, 255, 255);
    image.indices.copy_from_slice(&[1, 0, 1, 1]);

    let packed = pack(&image).unwrap();
    // palette words 0x0821 and 0xffff little endian, then bits 1,0,1,1
    assert_eq!(packed.bytes(), &[0x21, 0x08, 0xff, 0xff, 0x0d]);
}

#[test]
fn single_color_frames_pack_to_the_palette_alone() {
    let image = bgr_palette_image(1, 16, 16);
    let packed = pack(&image).unwrap();
    assert_eq!(packed.bytes().len(), 2);
}

#[test]
fn unpack_inverts_pack() {
    // 3-bit indices so the stream crosses byte boundaries
    let mut image = bgr_palette_image(5, 8, 4);
    for (i, entry) in image.palette.iter_mut().enumerate() {
        *entry = Pixel::from_bgr((i * 40) as u8, (i * 25) as u8, (255 - i * 50) as u8);
    }
    for (i, slot) in image.indices.iter_mut().enumerate() {
        *slot = (i % 5) as u32;
    }

    let packed = pack(&image).unwrap();
    let back = unpack(&packed).unwrap();

    assert_eq!(back.indices(), image.indices());
    assert_eq!(back.color_space(), ColorSpace::Bgr);
    for (got, want) in back.palette().iter().zip(image.palette.iter()) {
        let (b, g, r) = want.bgr();
        assert_eq!(got.bgr(), (b & !0b111, g & !0b11, r & !0b111));
    }
}

#[test]
fn rejected_inputs() {
    // palette still in the clustering domain
    let image = PaletteImage::new(4, 4, 4).unwrap();
    assert!(matches!(
        pack(&image),
        Err(Error::WrongColorSpace { .. })
    ));

    // corrupt index
    let mut image = bgr_palette_image(4, 4, 4);
    image.indices[9] = 4;
    assert!(matches!(
        pack(&image),
        Err(Error::IndexOutOfRange { index: 4, k: 4 })
    ));

    // wire buffer of the wrong length
    assert!(matches!(
        PackedImage::from_bytes(4, 4, 4, vec![0; 17]),
        Err(Error::SizeMismatch { expected: 12, found: 17 })
    ));
}
