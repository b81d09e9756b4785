//! K-means clustering over YCbCr pixels.
//!
//! Per-pixel distances stay in f32 so the assignment loop vectorizes;
//! error totals and center sums accumulate in f64 so convergence does not
//! depend on pixel order rounding.

use crate::error::Error;
use crate::raster::{ColorSpace, Image, PaletteImage, Pixel};

/// Absolute change in total assignment error, per pixel, below which the
/// clustering counts as settled.
const ERROR_THRESHOLD_PER_PIXEL: f64 = 0.001;

const DEFAULT_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// xorshift64 with a finalizing multiply. Center seeding needs
/// repeatability, not statistical strength.
#[derive(Debug, Clone)]
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Center {
    y: f32,
    cb: f32,
    cr: f32,
    y_sum: f64,
    cb_sum: f64,
    cr_sum: f64,
    count: usize,
}

impl Center {
    fn seed(pixel: Pixel) -> Self {
        let (y, cb, cr) = pixel.ycbcr();
        Self {
            y: y as f32,
            cb: cb as f32,
            cr: cr as f32,
            ..Default::default()
        }
    }

    fn distance_to(&self, pixel: Pixel) -> f32 {
        let (y, cb, cr) = pixel.ycbcr();
        let dy = y as f32 - self.y;
        let dcb = cb as f32 - self.cb;
        let dcr = cr as f32 - self.cr;
        (dy * dy + dcb * dcb + dcr * dcr).sqrt()
    }

    fn accumulate(&mut self, pixel: Pixel) {
        let (y, cb, cr) = pixel.ycbcr();
        self.y_sum += y as f64;
        self.cb_sum += cb as f64;
        self.cr_sum += cr as f64;
        self.count += 1;
    }

    fn clear(&mut self) {
        self.y_sum = 0.0;
        self.cb_sum = 0.0;
        self.cr_sum = 0.0;
        self.count = 0;
    }

    fn rounded(&self) -> Pixel {
        Pixel::from_ycbcr(
            self.y.round() as u8,
            self.cb.round() as i8,
            self.cr.round() as i8,
        )
    }
}

/// Palette builder. Owns only the seeding RNG; all raster state lives with
/// the caller so one quantizer can serve a whole stream of frames.
#[derive(Debug)]
pub struct Quantizer {
    rng: Rng,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Quantizer {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Same seed, same input, same hint: identical palette and indices.
    pub fn with_seed(seed: u64) -> Self {
        // xorshift sticks at zero
        let seed = if seed == 0 { DEFAULT_SEED } else { seed };
        Self { rng: Rng(seed) }
    }

    /// Clusters `image` into `dst.k()` colors, writing the palette and the
    /// per-pixel indices into `dst`.
    ///
    /// `image` must be YCbCr and match `dst`'s shape. A `hint` warm-starts
    /// the centers from an earlier palette of the same length, which keeps
    /// colors stable across near-identical frames; without one, centers
    /// start from randomly drawn pixels.
    ///
    /// Returns how many center updates the input still needed. 0 means the
    /// first update pass already left the assignment error stable, which is
    /// the steady state of an unchanging stream.
    pub fn quantize(
        &mut self,
        image: &Image,
        hint: Option<&[Pixel]>,
        dst: &mut PaletteImage,
    ) -> Result<usize, Error> {
        if image.color_space() != ColorSpace::YCbCr {
            return Err(Error::WrongColorSpace {
                expected: ColorSpace::YCbCr,
                found: image.color_space(),
            });
        }
        if image.width() != dst.width() || image.height() != dst.height() {
            return Err(Error::ShapeMismatch {
                width: dst.width(),
                height: dst.height(),
                found_width: image.width(),
                found_height: image.height(),
            });
        }
        let pixels = image.pixels();
        if pixels.is_empty() {
            return Err(Error::EmptyImage);
        }
        let k = dst.k();

        let mut centers: Vec<Center> = match hint {
            Some(palette) => {
                if palette.len() != k {
                    return Err(Error::PaletteSizeMismatch {
                        expected: k,
                        found: palette.len(),
                    });
                }
                palette.iter().copied().map(Center::seed).collect()
            }
            None => (0..k)
                .map(|_| Center::seed(pixels[self.rng.below(pixels.len())]))
                .collect(),
        };

        let threshold = ERROR_THRESHOLD_PER_PIXEL * pixels.len() as f64;
        let mut last_error = f64::INFINITY;
        let mut iterations = 0;

        loop {
            for center in centers.iter_mut() {
                center.clear();
            }

            // assignment: nearest center per pixel, first minimum wins ties
            let mut error = 0.0f64;
            for (pixel, slot) in pixels.iter().zip(dst.indices.iter_mut()) {
                let mut best = 0;
                let mut best_distance = f32::INFINITY;
                for (j, center) in centers.iter().enumerate() {
                    let distance = center.distance_to(*pixel);
                    if distance < best_distance {
                        best_distance = distance;
                        best = j;
                    }
                }
                *slot = best as u32;
                centers[best].accumulate(*pixel);
                error += best_distance as f64;
            }

            if (last_error - error).abs() < threshold {
                break;
            }
            // the pass out of the infinite sentinel confirms nothing, so it
            // does not count as a needed update
            if last_error.is_finite() {
                iterations += 1;
            }
            last_error = error;

            // update: move centers to their cluster means; a center that
            // attracted nothing restarts at a random pixel
            for center in centers.iter_mut() {
                if center.count == 0 {
                    *center = Center::seed(pixels[self.rng.below(pixels.len())]);
                } else {
                    center.y = (center.y_sum / center.count as f64) as f32;
                    center.cb = (center.cb_sum / center.count as f64) as f32;
                    center.cr = (center.cr_sum / center.count as f64) as f32;
                }
            }
        }

        for (entry, center) in dst.palette.iter_mut().zip(centers.iter()) {
            *entry = center.rounded();
        }
        dst.color_space = ColorSpace::YCbCr;

        Ok(iterations)
    }
}

#[cfg(test)]
fn solid_image(width: usize, height: usize, b: u8, g: u8, r: u8) -> Image {
    let mut image = Image::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Pixel::from_bgr(b, g, r);
    }
    image.to_ycbcr();
    image
}

#[cfg(test)]
fn noisy_image(width: usize, height: usize) -> Image {
    let mut image = Image::new(width, height);
    for (i, pixel) in image.pixels_mut().iter_mut().enumerate() {
        *pixel = Pixel::from_bgr(
            (i * 31 % 256) as u8,
            (i * 17 % 256) as u8,
            (i * 101 % 256) as u8,
        );
    }
    image.to_ycbcr();
    image
}

#[test]
fn solid_frame_needs_no_updates() {
    let image = solid_image(160, 80, 10, 200, 30);
    let mut out = PaletteImage::new(32, 160, 80).unwrap();
    let mut quantizer = Quantizer::with_seed(7);
    let iterations = quantizer.quantize(&image, None, &mut out).unwrap();

    assert_eq!(iterations, 0);
    // the first center absorbs every pixel, the tie-break never moves on
    assert!(out.indices().iter().all(|&index| index == 0));
    assert_eq!(out.palette()[0], image.pixels()[0]);
    assert_eq!(out.color_space(), ColorSpace::YCbCr);
}

#[test]
fn seeded_runs_are_identical() {
    let image = noisy_image(64, 32);
    let mut a = PaletteImage::new(8, 64, 32).unwrap();
    let mut b = PaletteImage::new(8, 64, 32).unwrap();
    Quantizer::with_seed(99).quantize(&image, None, &mut a).unwrap();
    Quantizer::with_seed(99).quantize(&image, None, &mut b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn noisy_frames_settle_quickly() {
    // full panel size, worst-case scattered input: the error threshold
    // must still stop the loop within a handful of updates
    let image = noisy_image(160, 80);
    let mut out = PaletteImage::new(32, 160, 80).unwrap();
    let mut quantizer = Quantizer::with_seed(42);
    let iterations = quantizer.quantize(&image, None, &mut out).unwrap();
    assert!(iterations < 100, "took {iterations} updates to settle");
}

#[test]
fn indices_stay_in_range() {
    let image = noisy_image(40, 20);
    let mut out = PaletteImage::new(5, 40, 20).unwrap();
    let mut quantizer = Quantizer::with_seed(1);
    quantizer.quantize(&image, None, &mut out).unwrap();
    assert!(out.indices().iter().all(|&index| (index as usize) < 5));
}

#[test]
fn hint_keeps_a_stable_palette() {
    let image = solid_image(32, 16, 80, 90, 100);
    let mut out = PaletteImage::new(4, 32, 16).unwrap();
    let mut quantizer = Quantizer::with_seed(3);
    quantizer.quantize(&image, None, &mut out).unwrap();

    let hint: Vec<Pixel> = out.palette().to_vec();
    let iterations = quantizer.quantize(&image, Some(&hint), &mut out).unwrap();
    assert_eq!(iterations, 0);
    assert_eq!(out.palette(), &hint[..]);
}

#[test]
fn bad_arguments_are_rejected() {
    let mut quantizer = Quantizer::new();

    // wrong domain
    let bgr = Image::new(8, 8);
    let mut out = PaletteImage::new(4, 8, 8).unwrap();
    assert!(matches!(
        quantizer.quantize(&bgr, None, &mut out),
        Err(Error::WrongColorSpace { .. })
    ));

    // shape disagreement
    let image = noisy_image(8, 4);
    assert!(matches!(
        quantizer.quantize(&image, None, &mut out),
        Err(Error::ShapeMismatch { .. })
    ));

    // short hint
    let image = noisy_image(8, 8);
    let hint = vec![Pixel::default(); 3];
    assert!(matches!(
        quantizer.quantize(&image, Some(&hint), &mut out),
        Err(Error::PaletteSizeMismatch { expected: 4, found: 3 })
    ));

    // no pixels to draw centers from
    let empty = {
        let mut empty = Image::new(0, 0);
        empty.to_ycbcr();
        empty
    };
    let mut out = PaletteImage::new(4, 0, 0).unwrap();
    assert!(matches!(
        quantizer.quantize(&empty, None, &mut out),
        Err(Error::EmptyImage)
    ));
}
