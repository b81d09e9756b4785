//! Fixed parameters of the attached panel and the defaults built from them.

use std::time::Duration;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 80;
/// The firmware decodes exactly this many RGB565 entries ahead of the
/// index stream.
pub const PALETTE_SIZE: usize = 32;
/// Bytes in one raw BGR frame as producers send it.
pub const FRAME_SIZE: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 3;
/// Floor on the spacing between two frames going out the serial port.
pub const FRAME_MIN_INTERVAL: Duration = Duration::from_millis(1000 / 30);
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/usb-screen-server";

/// Geometry and pacing of one server instance.
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub width: usize,
    pub height: usize,
    pub palette_size: usize,
    pub min_interval: Duration,
}

impl ServerOptions {
    pub fn frame_size(&self) -> usize {
        self.width * self.height * 3
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            palette_size: PALETTE_SIZE,
            min_interval: FRAME_MIN_INTERVAL,
        }
    }
}
