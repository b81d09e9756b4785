//! Offline check of the quantizer: palette-compresses a bmp and writes
//! the repainted result next to it, so the loss is visible in any image
//! viewer before a frame ever reaches hardware.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use palenc::{load_bmp, save_bmp, PaletteImage, Quantizer};

use uscreen::config::PALETTE_SIZE;

#[derive(Parser)]
struct Args {
    /// Source bmp, 24-bit uncompressed
    input: PathBuf,
    /// Where to write the compressed copy; derived from the input if absent
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Palette entries to quantize down to
    #[arg(short, long, default_value_t = PALETTE_SIZE)]
    colors: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("quantized.bmp"));

    let mut image = load_bmp(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    image.to_ycbcr();

    let mut quantized = PaletteImage::new(args.colors, image.width(), image.height())?;
    let iterations = Quantizer::new().quantize(&image, None, &mut quantized)?;
    println!("settled after {iterations} center updates");

    quantized.paint(&mut image)?;
    image.to_bgr();
    save_bmp(&image, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("wrote {}", output.display());
    Ok(())
}
