//! The fixed 3 byte frame exchanged with the programmer.

use std::fmt;

/// Every request and every reply is exactly this long.
pub const FRAME_SIZE: usize = 3;

/// Operation selector carried in the first byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Ping = 1,
    /// Reply to `Ping` only.
    Pong = 2,
    Reset = 3,
    WriteAddressRegister = 4,
    ReadAddressRegister = 5,
    WriteDataRegister = 6,
    ReadDataRegister = 7,
    Poll = 8,
    WriteSfr = 9,
    ReadSfr = 10,
    WriteCommand = 11,
    ReadResponse = 12,
    ReadData = 13,
    Halt = 14,
    ReadDeviceId = 15,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            1 => Ping,
            2 => Pong,
            3 => Reset,
            4 => WriteAddressRegister,
            5 => ReadAddressRegister,
            6 => WriteDataRegister,
            7 => ReadDataRegister,
            8 => Poll,
            9 => WriteSfr,
            10 => ReadSfr,
            11 => WriteCommand,
            12 => ReadResponse,
            13 => ReadData,
            14 => Halt,
            15 => ReadDeviceId,
            other => return Err(other),
        })
    }
}

/// A request or reply. Replies carry their payload in `data`.
///
/// The opcode is kept as a raw byte: the kernel module only rewrites it for
/// `Pong`, other replies echo whatever the reply buffer last held.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Frame {
    pub op: u8,
    pub data: u8,
    pub data2: u8,
}

impl Frame {
    pub fn new(op: Opcode, data: u8, data2: u8) -> Self {
        Frame {
            op: op as u8,
            data,
            data2,
        }
    }

    /// A request without payload.
    pub fn command(op: Opcode) -> Self {
        Self::new(op, 0, 0)
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.op).ok()
    }

    pub fn into_raw(self) -> [u8; FRAME_SIZE] {
        [self.op, self.data, self.data2]
    }

    pub fn from_raw(raw: [u8; FRAME_SIZE]) -> Self {
        Frame {
            op: raw[0],
            data: raw[1],
            data2: raw[2],
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(op) => write!(f, "{:?}[{:02x} {:02x}]", op, self.data, self.data2),
            None => write!(f, "OP({:02x})[{:02x} {:02x}]", self.op, self.data, self.data2),
        }
    }
}
