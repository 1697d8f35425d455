//! C2 primitives, one frame exchange each.

use crate::{
    constants::{ACK, FPDAT, commands},
    error::{Error, ResultExt, TransportError},
    protocol::{Frame, Opcode},
    transport::Transport,
};

type LinkResult<T> = std::result::Result<T, TransportError>;

/// Owns the link to the programmer for the duration of one command.
///
/// None of the operations retries: a failed exchange fails the operation.
pub struct Programmer<T: Transport> {
    transport: T,
}

impl<T: Transport> Programmer<T> {
    pub fn new(transport: T) -> Self {
        Programmer { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn cmd(&mut self, op: Opcode, data: u8, data2: u8) -> LinkResult<Frame> {
        self.transport.transfer(Frame::new(op, data, data2))
    }

    fn request(&mut self, op: Opcode) -> LinkResult<Frame> {
        self.transport.transfer(Frame::command(op))
    }

    /// Check if the programmer responds to commands.
    ///
    /// A link failure counts as "not reachable".
    pub fn check(&mut self) -> bool {
        match self.request(Opcode::Ping) {
            Ok(resp) => resp.op == Opcode::Pong as u8,
            Err(e) => {
                log::warn!("failed to communicate with the programmer: {}", e);
                false
            }
        }
    }

    /// Reset the target.
    pub fn reset(&mut self) -> LinkResult<()> {
        log::debug!("C2Prog: resetting target");
        self.request(Opcode::Reset).map(drop)
    }

    /// Halt the target.
    pub fn halt(&mut self) -> LinkResult<()> {
        log::debug!("C2Prog: halting target");
        self.request(Opcode::Halt).map(drop)
    }

    pub fn write_ar(&mut self, addr: u8) -> LinkResult<()> {
        log::debug!("C2Prog: writing address 0x{:02x}", addr);
        self.cmd(Opcode::WriteAddressRegister, addr, 0).map(drop)
    }

    pub fn read_ar(&mut self) -> LinkResult<u8> {
        Ok(self.request(Opcode::ReadAddressRegister)?.data)
    }

    pub fn write_dr(&mut self, data: u8) -> LinkResult<()> {
        log::debug!("C2Prog: writing data 0x{:02x}", data);
        self.cmd(Opcode::WriteDataRegister, data, 0).map(drop)
    }

    pub fn read_dr(&mut self) -> LinkResult<u8> {
        Ok(self.request(Opcode::ReadDataRegister)?.data)
    }

    /// Let the programmer wait until `flag` reads as `expected`.
    pub fn poll(&mut self, flag: u8, expected: u8) -> LinkResult<()> {
        log::debug!("C2Prog: polling flag 0x{:02x} for 0x{:02x}", flag, expected);
        self.cmd(Opcode::Poll, flag, expected).map(drop)
    }

    pub fn write_sfr(&mut self, addr: u8, data: u8) -> LinkResult<()> {
        log::debug!("C2Prog: writing SFR 0x{:02x} = 0x{:02x}", addr, data);
        self.cmd(Opcode::WriteSfr, addr, data).map(drop)
    }

    pub fn read_sfr(&mut self, addr: u8) -> LinkResult<u8> {
        log::debug!("C2Prog: reading SFR 0x{:02x}", addr);
        Ok(self.cmd(Opcode::ReadSfr, addr, 0)?.data)
    }

    /// Write one byte of the flash sub-protocol.
    pub fn write_command(&mut self, cmd: u8) -> LinkResult<()> {
        log::trace!("C2Prog: writing command 0x{:02x}", cmd);
        self.cmd(Opcode::WriteCommand, cmd, 0).map(drop)
    }

    /// Read the response to a command.
    pub fn read_response(&mut self) -> LinkResult<u8> {
        Ok(self.request(Opcode::ReadResponse)?.data)
    }

    /// Read the command data byte.
    pub fn read_data(&mut self) -> LinkResult<u8> {
        Ok(self.request(Opcode::ReadData)?.data)
    }

    pub fn read_device_id(&mut self) -> LinkResult<u8> {
        Ok(self.request(Opcode::ReadDeviceId)?.data)
    }

    /// Write an SFR on devices with SFR paging.
    pub fn write_direct(&mut self, addr: u8, data: u8) -> Result<(), Error> {
        self.begin_direct(commands::DIRECT_WRITE, addr, "direct write")?;
        self.write_command(data).during("direct write: data")
    }

    /// Read an SFR on devices with SFR paging.
    pub fn read_direct(&mut self, addr: u8) -> Result<u8, Error> {
        self.begin_direct(commands::DIRECT_READ, addr, "direct read")?;
        self.read_data().during("direct read: data")
    }

    fn begin_direct(&mut self, cmd: u8, addr: u8, step: &'static str) -> Result<(), Error> {
        self.write_ar(FPDAT).during(step)?;
        self.write_command(cmd).during(step)?;
        let actual = self.read_data().during(step)?;
        if actual != ACK {
            return Err(Error::ProtocolAck {
                step,
                expected: ACK,
                actual,
            });
        }
        self.write_command(addr).during(step)?;
        // one byte
        self.write_command(0x01).during(step)
    }

    /// Release the link.
    pub fn close(mut self) -> LinkResult<()> {
        self.transport.close()
    }
}
