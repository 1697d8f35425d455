//! Kernel module Transportation.
use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::Path,
    thread::sleep,
    time::{Duration, Instant},
};

use super::Transport;
use crate::{error::TransportError, protocol::FRAME_SIZE};

pub const DEFAULT_DEVICE_PATH: &str = "/dev/c2prog";

/// Retry interval while the module has no reply queued.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The C2 programmer implemented by the c2prog kernel module on GPIO pins.
pub struct KernelTransport {
    dev: Option<File>,
    timeout: Duration,
}

impl KernelTransport {
    pub fn open<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self, TransportError> {
        let path = path.as_ref();
        log::info!("Opening programmer device: {}", path.display());
        let dev = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(KernelTransport {
            dev: Some(dev),
            timeout,
        })
    }

    fn dev(&mut self) -> Result<&mut File, TransportError> {
        self.dev.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for KernelTransport {
    fn send_raw(&mut self, raw: &[u8; FRAME_SIZE]) -> Result<(), TransportError> {
        // the module rejects anything but a whole frame per write
        let n = self.dev()?.write(raw)?;
        if n != FRAME_SIZE {
            return Err(TransportError::ShortFrame(n));
        }
        Ok(())
    }

    fn recv_raw(&mut self) -> Result<[u8; FRAME_SIZE], TransportError> {
        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        let dev = self.dev()?;
        let mut buf = [0u8; FRAME_SIZE];
        loop {
            match dev.read(&mut buf) {
                // nothing queued yet
                Ok(0) => (),
                // the module stops copying at the first NUL byte, the rest
                // of the frame is zero
                Ok(_) => return Ok(buf),
                Err(e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout(timeout));
            }
            sleep(POLL_INTERVAL);
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.dev.take() {
            Some(dev) => {
                log::debug!("Closing programmer device");
                drop(dev);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}
