use image::{Rgb, RgbImage};

use crate::color;
use crate::error::Error;

/// Which domain the bytes of a [`Pixel`] currently live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// blue, green, red, one byte each
    Bgr,
    /// luma plus two signed chroma offsets
    YCbCr,
}

/// One pixel, three bytes, meaning decided by the owning raster's
/// [`ColorSpace`] tag.
///
/// Chroma components are signed; they are kept as the raw two's-complement
/// byte and cast on access, so the same storage serves both domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel(pub(crate) [u8; 3]);

impl Pixel {
    pub fn from_bgr(b: u8, g: u8, r: u8) -> Self {
        Self([b, g, r])
    }

    pub fn from_ycbcr(y: u8, cb: i8, cr: i8) -> Self {
        Self([y, cb as u8, cr as u8])
    }

    pub fn bgr(&self) -> (u8, u8, u8) {
        (self.0[0], self.0[1], self.0[2])
    }

    pub fn ycbcr(&self) -> (u8, i8, i8) {
        (self.0[0], self.0[1] as i8, self.0[2] as i8)
    }
}

/// An owned full-resolution raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) color_space: ColorSpace,
    pub(crate) pixels: Vec<Pixel>,
}

impl Image {
    /// An all-black BGR raster.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            color_space: ColorSpace::Bgr,
            pixels: vec![Pixel::default(); width * height],
        }
    }

    /// Builds a raster from one raw wire frame: row-major, three bytes per
    /// pixel, blue first.
    pub fn from_bgr_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self, Error> {
        let mut image = Self::new(width, height);
        image.fill_from_bgr_bytes(bytes)?;
        Ok(image)
    }

    /// Overwrites the pixel data from one raw wire frame without
    /// reallocating, and tags the raster BGR again. The slice must hold
    /// exactly `width * height * 3` bytes.
    pub fn fill_from_bgr_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let expected = self.pixels.len() * 3;
        if bytes.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                found: bytes.len(),
            });
        }
        for (pixel, src) in self.pixels.iter_mut().zip(bytes.chunks_exact(3)) {
            pixel.0.copy_from_slice(src);
        }
        self.color_space = ColorSpace::Bgr;
        Ok(())
    }

    /// The same frame as one raw byte vector, the format producers put on
    /// the wire.
    pub fn bgr_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.color_space != ColorSpace::Bgr {
            return Err(Error::WrongColorSpace {
                expected: ColorSpace::Bgr,
                found: self.color_space,
            });
        }
        let mut bytes = Vec::with_capacity(self.pixels.len() * 3);
        for pixel in &self.pixels {
            bytes.extend_from_slice(&pixel.0);
        }
        Ok(bytes)
    }

    /// Bridge from the `image` crate, swapping RGB byte order to ours.
    pub fn from_rgb(src: &RgbImage) -> Self {
        let mut image = Self::new(src.width() as usize, src.height() as usize);
        for (pixel, src) in image.pixels.iter_mut().zip(src.pixels()) {
            let [r, g, b] = src.0;
            *pixel = Pixel::from_bgr(b, g, r);
        }
        image
    }

    /// Bridge back to the `image` crate. The raster must be BGR.
    pub fn to_rgb(&self) -> Result<RgbImage, Error> {
        if self.color_space != ColorSpace::Bgr {
            return Err(Error::WrongColorSpace {
                expected: ColorSpace::Bgr,
                found: self.color_space,
            });
        }
        Ok(RgbImage::from_fn(
            self.width as u32,
            self.height as u32,
            |x, y| {
                let (b, g, r) = self.pixels[y as usize * self.width + x as usize].bgr();
                Rgb([r, g, b])
            },
        ))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    /// Converts every pixel to YCbCr in place. Already-converted rasters are
    /// left alone.
    pub fn to_ycbcr(&mut self) {
        if self.color_space == ColorSpace::Bgr {
            color::bgr_to_ycbcr(&mut self.pixels);
            self.color_space = ColorSpace::YCbCr;
        }
    }

    /// Converts every pixel back to BGR in place.
    pub fn to_bgr(&mut self) {
        if self.color_space == ColorSpace::YCbCr {
            color::ycbcr_to_bgr(&mut self.pixels);
            self.color_space = ColorSpace::Bgr;
        }
    }
}

/// A quantized raster: `k` palette colors plus one palette index per pixel.
///
/// Fresh instances are tagged YCbCr because that is the domain the
/// quantizer fills them in; only the palette entries ever change domain,
/// the index array is identical in both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteImage {
    pub(crate) k: usize,
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) color_space: ColorSpace,
    pub(crate) palette: Vec<Pixel>,
    pub(crate) indices: Vec<u32>,
}

impl PaletteImage {
    pub fn new(k: usize, width: usize, height: usize) -> Result<Self, Error> {
        if k == 0 {
            return Err(Error::EmptyPalette);
        }
        Ok(Self {
            k,
            width,
            height,
            color_space: ColorSpace::YCbCr,
            palette: vec![Pixel::default(); k],
            indices: vec![0; width * height],
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

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn palette(&self) -> &[Pixel] {
        &self.palette
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Converts the palette entries to BGR, leaving the indices untouched.
    pub fn palette_to_bgr(&mut self) {
        if self.color_space == ColorSpace::YCbCr {
            color::ycbcr_to_bgr(&mut self.palette);
            self.color_space = ColorSpace::Bgr;
        }
    }

    /// Converts the palette entries to YCbCr, leaving the indices untouched.
    pub fn palette_to_ycbcr(&mut self) {
        if self.color_space == ColorSpace::Bgr {
            color::bgr_to_ycbcr(&mut self.palette);
            self.color_space = ColorSpace::YCbCr;
        }
    }

    /// Expands the indices through the palette into a full raster. `dst`
    /// takes this image's color space.
    pub fn paint(&self, dst: &mut Image) -> Result<(), Error> {
        if dst.width != self.width || dst.height != self.height {
            return Err(Error::ShapeMismatch {
                width: self.width,
                height: self.height,
                found_width: dst.width,
                found_height: dst.height,
            });
        }
        for (pixel, &index) in dst.pixels.iter_mut().zip(self.indices.iter()) {
            *pixel = *self
                .palette
                .get(index as usize)
                .ok_or(Error::IndexOutOfRange { index, k: self.k })?;
        }
        dst.color_space = self.color_space;
        Ok(())
    }
}

#[test]
fn pixel_accessors_round_trip() {
    let pixel = Pixel::from_ycbcr(200, -30, 101);
    assert_eq!(pixel.ycbcr(), (200, -30, 101));
    let pixel = Pixel::from_bgr(1, 2, 3);
    assert_eq!(pixel.bgr(), (1, 2, 3));
}

#[test]
fn wire_bytes_round_trip() {
    let bytes: Vec<u8> = (0u8..24).collect();
    let image = Image::from_bgr_bytes(4, 2, &bytes).unwrap();
    assert_eq!(image.color_space(), ColorSpace::Bgr);
    assert_eq!(image.pixels()[1].bgr(), (3, 4, 5));
    assert_eq!(image.bgr_bytes().unwrap(), bytes);
}

#[test]
fn wrong_frame_size_is_rejected() {
    let mut image = Image::new(4, 2);
    let result = image.fill_from_bgr_bytes(&[0u8; 23]);
    assert!(matches!(result, Err(Error::SizeMismatch { expected: 24, found: 23 })));
}

#[test]
fn rgb_bridge_swaps_byte_order() {
    let mut rgb = RgbImage::new(2, 1);
    rgb.put_pixel(0, 0, Rgb([10, 20, 30]));
    rgb.put_pixel(1, 0, Rgb([40, 50, 60]));
    let image = Image::from_rgb(&rgb);
    assert_eq!(image.pixels()[0].bgr(), (30, 20, 10));
    assert_eq!(image.to_rgb().unwrap(), rgb);
}

#[test]
fn paint_expands_indices() {
    let mut quantized = PaletteImage::new(2, 2, 2).unwrap();
    quantized.palette[0] = Pixel::from_ycbcr(10, 0, 0);
    quantized.palette[1] = Pixel::from_ycbcr(250, -5, 5);
    quantized.indices.copy_from_slice(&[0, 1, 1, 0]);

    let mut out = Image::new(2, 2);
    quantized.paint(&mut out).unwrap();
    assert_eq!(out.color_space(), ColorSpace::YCbCr);
    assert_eq!(out.pixels()[0].ycbcr(), (10, 0, 0));
    assert_eq!(out.pixels()[2].ycbcr(), (250, -5, 5));
}

#[test]
fn palette_conversion_leaves_indices_untouched() {
    let mut quantized = PaletteImage::new(2, 2, 2).unwrap();
    quantized.palette[1] = Pixel::from_ycbcr(128, 0, 0);
    quantized.indices.copy_from_slice(&[1, 0, 0, 1]);

    quantized.palette_to_bgr();
    assert_eq!(quantized.color_space(), ColorSpace::Bgr);
    assert_eq!(quantized.indices(), &[1, 0, 0, 1]);
    assert_eq!(quantized.palette()[1].bgr(), (128, 128, 128));

    // converting twice is a no-op
    quantized.palette_to_bgr();
    assert_eq!(quantized.palette()[1].bgr(), (128, 128, 128));
}

#[test]
fn paint_rejects_bad_indices() {
    let mut quantized = PaletteImage::new(2, 2, 1).unwrap();
    quantized.indices[1] = 7;
    let mut out = Image::new(2, 1);
    let result = quantized.paint(&mut out);
    assert!(matches!(result, Err(Error::IndexOutOfRange { index: 7, k: 2 })));
}
