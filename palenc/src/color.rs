//! BT.709 conversion between the wire's BGR byte order and the luma/chroma
//! domain the quantizer clusters in.
//!
//! The two directions are intentionally not mirror images: forward narrows
//! rounded f32 sums, the inverse narrows truncated f64 sums. The screen
//! firmware decodes with exactly these tables, so neither half is free to
//! change on its own.

use crate::raster::Pixel;

/// Converts BGR pixels to YCbCr in place.
pub fn bgr_to_ycbcr(pixels: &mut [Pixel]) {
    for pixel in pixels {
        let (b, g, r) = pixel.bgr();
        let (b, g, r) = (b as f32, g as f32, r as f32);
        let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let cb = -0.1146 * r - 0.3854 * g + 0.5 * b;
        let cr = 0.5 * r - 0.4542 * g - 0.0458 * b;
        *pixel = Pixel::from_ycbcr(y.round() as u8, cb.round() as i8, cr.round() as i8);
    }
}

/// Converts YCbCr pixels back to BGR in place.
pub fn ycbcr_to_bgr(pixels: &mut [Pixel]) {
    for pixel in pixels {
        let (y, cb, cr) = pixel.ycbcr();
        let (y, cb, cr) = (y as f64, cb as f64, cr as f64);
        let r = y + 1.5748 * cr;
        let g = y - 0.1873 * cb - 0.4681 * cr;
        let b = y + 1.8556 * cb;
        *pixel = Pixel::from_bgr(b as u8, g as u8, r as u8);
    }
}

#[test]
fn grayscale_has_no_chroma() {
    let mut pixels = [Pixel::from_bgr(255, 255, 255), Pixel::from_bgr(0, 0, 0)];
    bgr_to_ycbcr(&mut pixels);
    assert_eq!(pixels[0].ycbcr(), (255, 0, 0));
    assert_eq!(pixels[1].ycbcr(), (0, 0, 0));
}

#[test]
fn saturated_chroma_narrows_without_wrapping() {
    // pure red lands on cr = 127.5, which must clip to 127 and not wrap
    let mut pixels = [Pixel::from_bgr(0, 0, 255)];
    bgr_to_ycbcr(&mut pixels);
    let (_, _, cr) = pixels[0].ycbcr();
    assert_eq!(cr, 127);
}

#[test]
fn round_trip_stays_within_two_per_channel() {
    for b in (0u16..=255).step_by(17) {
        for g in (0u16..=255).step_by(17) {
            for r in (0u16..=255).step_by(17) {
                let mut pixels = [Pixel::from_bgr(b as u8, g as u8, r as u8)];
                bgr_to_ycbcr(&mut pixels);
                ycbcr_to_bgr(&mut pixels);
                let (b2, g2, r2) = pixels[0].bgr();
                for (before, after) in [(b, b2 as u16), (g, g2 as u16), (r, r2 as u16)] {
                    assert!(
                        before.abs_diff(after) <= 2,
                        "channel drifted from {before} to {after} for bgr({b},{g},{r})"
                    );
                }
            }
        }
    }
}
