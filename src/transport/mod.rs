//! Abstract programmer transport interface.
use std::{path::PathBuf, time::Duration};

use crate::{
    error::TransportError,
    protocol::{FRAME_SIZE, Frame},
};

pub use self::kernel::{DEFAULT_DEVICE_PATH, KernelTransport};
pub use self::serial::{DEFAULT_BAUDRATE, DEFAULT_PORT, SerialTransport};

mod kernel;
mod serial;
#[cfg(test)]
pub(crate) mod sim;

/// Default time to wait for a reply frame.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Abstraction of the transport layer.
/// Either the c2prog kernel module or a serial attached bridge.
///
/// Requests and replies are strictly paired: a reply is only read right after
/// its request was written.
pub trait Transport {
    fn send_raw(&mut self, raw: &[u8; FRAME_SIZE]) -> Result<(), TransportError>;
    fn recv_raw(&mut self) -> Result<[u8; FRAME_SIZE], TransportError>;
    /// Release the underlying channel. Later calls fail with `Closed`.
    fn close(&mut self) -> Result<(), TransportError>;

    fn transfer(&mut self, frame: Frame) -> Result<Frame, TransportError> {
        let req = frame.into_raw();
        log::trace!("=> {}", hex::encode(req));
        self.send_raw(&req)?;

        let resp = self.recv_raw()?;
        log::trace!("<= {}", hex::encode(resp));
        Ok(Frame::from_raw(resp))
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_raw(&mut self, raw: &[u8; FRAME_SIZE]) -> Result<(), TransportError> {
        (**self).send_raw(raw)
    }

    fn recv_raw(&mut self) -> Result<[u8; FRAME_SIZE], TransportError> {
        (**self).recv_raw()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// Which link to open at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkConfig {
    /// Character device exported by the c2prog kernel module.
    Kernel { path: PathBuf, timeout: Duration },
    /// Bridge controller behind a serial port.
    Serial {
        port: String,
        baudrate: u32,
        timeout: Duration,
    },
}

impl LinkConfig {
    pub fn open(&self) -> Result<Box<dyn Transport>, TransportError> {
        let transport: Box<dyn Transport> = match self {
            LinkConfig::Kernel { path, timeout } => {
                Box::new(KernelTransport::open(path, *timeout)?)
            }
            LinkConfig::Serial {
                port,
                baudrate,
                timeout,
            } => Box::new(SerialTransport::open(port, *baudrate, *timeout)?),
        };
        Ok(transport)
    }
}
