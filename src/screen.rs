//! Delivery of packed frames to the panel.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Sink for packed frames. The server owns exactly one of these.
pub trait Screen {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// The panel's CDC-ACM serial device.
///
/// The device file is held open across frames and closed on any write
/// error; the next frame reopens it. Unplugging the cable therefore costs
/// the frames sent while it is out, nothing more.
pub struct UsbScreen {
    path: PathBuf,
    device: Option<File>,
}

impl UsbScreen {
    /// Opens the device at `path`, failing outright if it is not there at
    /// startup.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let device = open_raw(&path)?;
        Ok(Self {
            path,
            device: Some(device),
        })
    }
}

impl Screen for UsbScreen {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut device = match self.device.take() {
            Some(device) => device,
            None => {
                debug!(path = %self.path.display(), "reopening screen device");
                open_raw(&self.path)?
            }
        };
        // on error the File is dropped here, closing the stale descriptor
        device.write_all(frame)?;
        device.flush()?;
        self.device = Some(device);
        Ok(())
    }
}

/// Opens a serial device and puts the line in raw mode so the tty layer
/// passes frame bytes through untouched.
fn open_raw(path: &Path) -> io::Result<File> {
    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)?;
    set_raw(&device)?;
    Ok(device)
}

fn set_raw(device: &File) -> io::Result<()> {
    let fd = device.as_raw_fd();
    unsafe {
        let mut termios = std::mem::zeroed::<libc::termios>();
        if libc::tcgetattr(fd, &mut termios) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut termios);
        termios.c_cflag |= libc::CLOCAL | libc::CREAD;
        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
