//! Serial Transportation.
use std::{
    io::{ErrorKind, Read, Write},
    time::Duration,
};

use serialport::SerialPort;

use super::Transport;
use crate::{error::TransportError, protocol::FRAME_SIZE};

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115200;

/// A bridge controller relaying frames to the C2 pins.
pub struct SerialTransport {
    serial_port: Option<Box<dyn SerialPort>>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn open(port: &str, baudrate: u32, timeout: Duration) -> Result<Self, TransportError> {
        log::info!("Opening serial port: \"{}\" @ {} baud", port, baudrate);
        let port = serialport::new(port, baudrate).timeout(timeout).open()?;
        Ok(SerialTransport {
            serial_port: Some(port),
            timeout,
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.serial_port.as_mut().ok_or(TransportError::Closed)
    }
}

/// Read one reply frame, the bridge always sends all 3 bytes.
fn read_frame<R: Read + ?Sized>(
    port: &mut R,
    timeout: Duration,
) -> Result<[u8; FRAME_SIZE], TransportError> {
    let mut buf = [0u8; FRAME_SIZE];
    match port.read_exact(&mut buf) {
        Ok(()) => Ok(buf),
        Err(e) if e.kind() == ErrorKind::TimedOut => Err(TransportError::Timeout(timeout)),
        Err(e) => Err(e.into()),
    }
}

impl Transport for SerialTransport {
    fn send_raw(&mut self, raw: &[u8; FRAME_SIZE]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(raw)?;
        port.flush()?;
        Ok(())
    }

    fn recv_raw(&mut self) -> Result<[u8; FRAME_SIZE], TransportError> {
        let timeout = self.timeout;
        read_frame(self.port()?, timeout)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.serial_port.take() {
            Some(port) => {
                log::debug!("Closing serial port");
                drop(port);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(10);

    // a port with nothing to deliver
    struct Silent;

    impl Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::TimedOut, "operation timed out"))
        }
    }

    #[test]
    fn reads_whole_frame() {
        let mut port: &[u8] = &[2, 0x34, 0, 0xAA];
        assert_eq!(read_frame(&mut port, TIMEOUT).unwrap(), [2, 0x34, 0]);
        // only one frame consumed
        assert_eq!(port, &[0xAA]);
    }

    #[test]
    fn port_timeout_becomes_link_timeout() {
        match read_frame(&mut Silent, TIMEOUT) {
            Err(TransportError::Timeout(t)) => assert_eq!(t, TIMEOUT),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn truncated_reply_is_an_io_error() {
        let mut port: &[u8] = &[2, 0x34];
        assert!(matches!(
            read_frame(&mut port, TIMEOUT),
            Err(TransportError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof
        ));
    }
}
