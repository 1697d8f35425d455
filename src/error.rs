//! Error types of the programmer stack.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::protocol::FRAME_SIZE;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of the link to the programmer. Unrecoverable for the current
/// command, the link may need to be reopened.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("I/O error on programmer link: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("short frame: expected {size} bytes, transferred {0}", size = FRAME_SIZE)]
    ShortFrame(usize),
    #[error("no reply from programmer within {0:?}")]
    Timeout(Duration),
    #[error("programmer link is closed")]
    Closed,
}

/// A single byte that differs between the image and the read-back flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub offset: usize,
    pub expected: u8,
    pub actual: u8,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offset 0x{:04x}: expected 0x{:02x}, read 0x{:02x}",
            self.offset, self.expected, self.actual
        )
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("{step}: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("programmer does not answer")]
    Unreachable,
    #[error("{step}: unexpected command result, expected 0x{expected:02x}, actual 0x{actual:02x}")]
    ProtocolAck {
        step: &'static str,
        expected: u8,
        actual: u8,
    },
    #[error(
        "unsupported device id 0x{0:02x}, only the EFM8 (0x{id:02x}) is supported",
        id = crate::constants::SUPPORTED_DEVICE_ID
    )]
    UnsupportedDevice(u8),
    #[error("verify failed, {} byte(s) differ", .0.len())]
    VerifyMismatch(Vec<Mismatch>),
    #[error("address register read back 0x{actual:02x}, expected 0x{expected:02x}")]
    AddressRegisterMismatch { expected: u8, actual: u8 },
    #[error("invalid block length {0}, must be 1 to {max} bytes", max = crate::constants::BLOCK_SIZE)]
    InvalidBlockLength(usize),
    #[error("image of {size} bytes does not fit into {capacity} bytes of flash")]
    ImageTooLarge { size: usize, capacity: usize },
}

/// Attaches the name of the protocol step to a transport failure.
pub(crate) trait ResultExt<T> {
    fn during(self, step: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, TransportError> {
    fn during(self, step: &'static str) -> Result<T> {
        self.map_err(|source| Error::Transport { step, source })
    }
}
