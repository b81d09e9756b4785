//! Sends one image file to a running server, scaled to the panel.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use image::imageops::{self, FilterType};
use image::RgbImage;

use uscreen::config::{DEFAULT_SOCKET_PATH, SCREEN_HEIGHT, SCREEN_WIDTH};

#[derive(Parser)]
struct Args {
    /// Image file to show
    image: PathBuf,
    /// How to fit the image to the panel
    #[arg(short, long, value_enum, default_value_t = Mode::Fit)]
    mode: Mode,
    /// Socket the server listens on
    #[arg(short, long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Distort to exactly the panel size
    Stretch,
    /// Letterbox on black, keeping the aspect ratio
    Fit,
    /// Crop to fill the panel, keeping the aspect ratio
    Fill,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let width = SCREEN_WIDTH as u32;
    let height = SCREEN_HEIGHT as u32;

    let loaded = image::open(&args.image)
        .with_context(|| format!("failed to load {}", args.image.display()))?;
    let framed: RgbImage = match args.mode {
        Mode::Stretch => loaded
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgb8(),
        Mode::Fit => {
            let scaled = loaded.resize(width, height, FilterType::Lanczos3).to_rgb8();
            let mut canvas = RgbImage::from_pixel(width, height, image::Rgb([0, 0, 0]));
            imageops::overlay(
                &mut canvas,
                &scaled,
                (width - scaled.width()) / 2,
                (height - scaled.height()) / 2,
            );
            canvas
        }
        Mode::Fill => loaded
            .resize_to_fill(width, height, FilterType::Lanczos3)
            .to_rgb8(),
    };

    let frame = palenc::Image::from_rgb(&framed);
    let mut stream = UnixStream::connect(&args.socket)
        .with_context(|| format!("no server listening at {}", args.socket.display()))?;
    stream.write_all(&frame.bgr_bytes()?)?;
    Ok(())
}
