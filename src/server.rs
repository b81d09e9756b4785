//! The frame server: accepts raw BGR frames from local producers over a
//! unix socket, compresses them, and paces them onto the screen.
//!
//! Producers just connect and stream whole frames; the server never talks
//! back. Frames arriving faster than the pacing interval overwrite each
//! other, so after a burst the screen shows the newest frame, no backlog.

use std::io;
use std::mem;
use std::path::Path;

use palenc::{Image, PackedImage, PaletteImage, Pixel, Quantizer};
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ServerOptions;
use crate::screen::Screen;

pub struct FrameServer<S> {
    options: ServerOptions,
    screen: S,
    // scratch buffers, allocated once and reused every frame
    frame: Image,
    quantized: PaletteImage,
    packed: PackedImage,
    quantizer: Quantizer,
    hint: Option<Vec<Pixel>>,
    /// When the pipeline last ran, whether or not a frame reached the
    /// screen. Arriving frames are held until `min_interval` past this.
    last_process: Instant,
    /// Newest frame not yet processed.
    pending: Option<Vec<u8>>,
    /// When armed, the instant the pending frame becomes due.
    deadline: Option<Instant>,
}

impl<S: Screen> FrameServer<S> {
    pub fn new(options: ServerOptions, screen: S) -> Result<Self, palenc::Error> {
        Ok(Self {
            options,
            screen,
            frame: Image::new(options.width, options.height),
            quantized: PaletteImage::new(options.palette_size, options.width, options.height)?,
            packed: PackedImage::new(options.palette_size, options.width, options.height)?,
            quantizer: Quantizer::new(),
            hint: None,
            last_process: Instant::now(),
            pending: None,
            deadline: None,
        })
    }

    /// Serves forever. Returns only if accepting fails outright.
    pub async fn run(mut self, listener: UnixListener) -> io::Result<()> {
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        self.last_process = Instant::now();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    debug!("producer connected");
                    tokio::spawn(read_frames(
                        stream,
                        self.options.frame_size(),
                        frames_tx.clone(),
                    ));
                }
                received = frames_rx.recv() => {
                    match received {
                        Some(bytes) => self.on_frame(bytes),
                        // a sender lives on this stack frame, recv cannot fail
                        None => unreachable!(),
                    }
                }
                _ = tokio::time::sleep_until(self.deadline.unwrap_or_else(Instant::now)),
                    if self.deadline.is_some() =>
                {
                    self.deadline = None;
                    self.process_pending();
                }
            }
        }
    }

    /// A frame arrived: remember it, then process now or at the deadline
    /// depending on how recently the last one went out.
    fn on_frame(&mut self, bytes: Vec<u8>) {
        self.pending = Some(bytes);
        if self.deadline.is_some() {
            return;
        }
        let due = self.last_process + self.options.min_interval;
        if Instant::now() < due {
            self.deadline = Some(due);
        } else {
            self.process_pending();
        }
    }

    fn process_pending(&mut self) {
        let bytes = match self.pending.take() {
            Some(bytes) => bytes,
            None => return,
        };
        self.last_process = Instant::now();
        if let Err(error) = self.process(&bytes) {
            warn!(%error, "dropping frame");
        }
    }

    /// Runs one frame through the whole pipeline: convert, quantize, pack,
    /// write. A screen write failure is logged but does not fail the frame;
    /// the palette hint must advance so the stream stays warm-started.
    fn process(&mut self, bytes: &[u8]) -> Result<(), palenc::Error> {
        self.frame.fill_from_bgr_bytes(bytes)?;
        self.frame.to_ycbcr();
        let iterations =
            self.quantizer
                .quantize(&self.frame, self.hint.as_deref(), &mut self.quantized)?;
        self.hint = Some(self.quantized.palette().to_vec());
        self.quantized.palette_to_bgr();
        palenc::pack_into(&self.quantized, &mut self.packed)?;
        debug!(iterations, "frame quantized");
        if let Err(error) = self.screen.write_frame(self.packed.bytes()) {
            warn!(%error, "frame not written to screen");
        }
        Ok(())
    }
}

/// Reads fixed-size frames off one producer connection until it closes,
/// forwarding each completed frame to the server loop.
async fn read_frames(
    mut stream: UnixStream,
    frame_size: usize,
    frames: mpsc::UnboundedSender<Vec<u8>>,
) {
    let mut buffer = vec![0u8; frame_size];
    let mut filled = 0;
    loop {
        match stream.read(&mut buffer[filled..]).await {
            Ok(0) => {
                debug!("producer disconnected");
                return;
            }
            Ok(read) => {
                filled += read;
                if filled == frame_size {
                    filled = 0;
                    let frame = mem::replace(&mut buffer, vec![0u8; frame_size]);
                    if frames.send(frame).is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                debug!(%error, "producer read failed");
                return;
            }
        }
    }
}

/// Binds the listening socket, clearing a stale socket file left by an
/// earlier run.
pub fn bind_socket(path: impl AsRef<Path>) -> io::Result<UnixListener> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    UnixListener::bind(path)
}

#[cfg(test)]
use std::sync::{Arc, Mutex};
#[cfg(test)]
use std::time::Duration;

/// Screen stand-in that keeps every frame written to it.
#[cfg(test)]
#[derive(Default, Clone)]
struct RecordingScreen {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[cfg(test)]
impl Screen for RecordingScreen {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

#[cfg(test)]
struct FailingScreen;

#[cfg(test)]
impl Screen for FailingScreen {
    fn write_frame(&mut self, _frame: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }
}

#[cfg(test)]
fn small_options(min_interval: Duration) -> ServerOptions {
    ServerOptions {
        width: 4,
        height: 2,
        palette_size: 4,
        min_interval,
    }
}

#[cfg(test)]
fn test_socket(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("uscreen-test-{}-{}", name, std::process::id()))
}

#[test]
fn pipeline_writes_packed_frames() {
    let screen = RecordingScreen::default();
    let frames = screen.frames.clone();
    let mut server = FrameServer::new(small_options(Duration::ZERO), screen).unwrap();

    server.on_frame(vec![200; 4 * 2 * 3]);

    let recorded = frames.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].len(), palenc::packed_len(4, 4, 2).unwrap());
}

#[tokio::test]
async fn rapid_frames_coalesce_into_one_processing_pass() {
    let socket = test_socket("coalesce");
    let listener = bind_socket(&socket).unwrap();
    let screen = RecordingScreen::default();
    let frames = screen.frames.clone();
    let options = small_options(Duration::from_millis(300));
    let server = FrameServer::new(options, screen).unwrap();
    let task = tokio::spawn(server.run(listener));

    let mut stream = tokio::net::UnixStream::connect(&socket).await.unwrap();
    for shade in [60u8, 120, 180] {
        tokio::io::AsyncWriteExt::write_all(&mut stream, &vec![shade; options.frame_size()])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    let recorded = frames.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1, "a burst must collapse to its last frame");

    // the one processed frame is the last one sent, gray 180
    let packed = PackedImage::from_bytes(4, 4, 2, recorded[0].clone()).unwrap();
    let unpacked = palenc::unpack(&packed).unwrap();
    let (b, g, r) = unpacked.palette()[unpacked.indices()[0] as usize].bgr();
    for channel in [b, g, r] {
        assert!(channel.abs_diff(180) <= 8, "expected near-180 gray, got {channel}");
    }

    task.abort();
    let _ = std::fs::remove_file(&socket);
}

#[tokio::test]
async fn spaced_frames_each_reach_the_screen() {
    let socket = test_socket("spaced");
    let listener = bind_socket(&socket).unwrap();
    let screen = RecordingScreen::default();
    let frames = screen.frames.clone();
    let options = small_options(Duration::from_millis(10));
    let server = FrameServer::new(options, screen).unwrap();
    let task = tokio::spawn(server.run(listener));

    let mut stream = tokio::net::UnixStream::connect(&socket).await.unwrap();
    for shade in [40u8, 220] {
        tokio::io::AsyncWriteExt::write_all(&mut stream, &vec![shade; options.frame_size()])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    assert_eq!(frames.lock().unwrap().len(), 2);

    task.abort();
    let _ = std::fs::remove_file(&socket);
}

#[tokio::test]
async fn disconnect_leaves_server_accepting() {
    let socket = test_socket("reconnect");
    let listener = bind_socket(&socket).unwrap();
    let screen = RecordingScreen::default();
    let frames = screen.frames.clone();
    let options = small_options(Duration::ZERO);
    let server = FrameServer::new(options, screen).unwrap();
    let task = tokio::spawn(server.run(listener));

    for shade in [10u8, 250] {
        let mut stream = tokio::net::UnixStream::connect(&socket).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut stream, &vec![shade; options.frame_size()])
            .await
            .unwrap();
        drop(stream);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(frames.lock().unwrap().len(), 2);

    task.abort();
    let _ = std::fs::remove_file(&socket);
}

#[tokio::test]
async fn screen_failure_does_not_stop_the_pipeline() {
    let socket = test_socket("failing");
    let listener = bind_socket(&socket).unwrap();
    let options = small_options(Duration::ZERO);
    let server = FrameServer::new(options, FailingScreen).unwrap();
    let task = tokio::spawn(server.run(listener));

    let mut stream = tokio::net::UnixStream::connect(&socket).await.unwrap();
    for shade in [90u8, 30] {
        tokio::io::AsyncWriteExt::write_all(&mut stream, &vec![shade; options.frame_size()])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(!task.is_finished(), "write failures must not kill the server");

    task.abort();
    let _ = std::fs::remove_file(&socket);
}
