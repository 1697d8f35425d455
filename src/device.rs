//! EFM8 flash sequences built on the C2 primitives.
use std::{fmt, thread::sleep};

use crate::{
    constants::{ACK, BLOCK_SIZE, FPDAT, SUPPORTED_DEVICE_ID, commands, init, registers},
    error::{Error, Result, ResultExt},
    programmer::Programmer,
    transport::Transport,
};

/// Identification registers of the connected chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub device_id: u8,
    pub revision_id: u8,
    pub secondary_id: u8,
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chip ID: 0x{:02x}, Rev ID: 0x{:02x}, Second Chip ID: 0x{:02x}",
            self.device_id, self.revision_id, self.secondary_id
        )
    }
}

/// The supported EFM8 target behind a programmer.
///
/// Every flash sub-protocol exchange starts by pointing the address register
/// at FPDAT and checks for [`ACK`] at each checkpoint. The first bad
/// acknowledgement or link failure aborts the sequence.
pub struct Device<T: Transport> {
    prog: Programmer<T>,
}

impl<T: Transport> Device<T> {
    pub fn new(prog: Programmer<T>) -> Self {
        Device { prog }
    }

    pub fn programmer(&self) -> &Programmer<T> {
        &self.prog
    }

    pub fn into_programmer(self) -> Programmer<T> {
        self.prog
    }

    /// Halt the chip, check its identity and prepare it for flash access
    /// (AN127). Returns the device id.
    ///
    /// Nothing is written to the chip when the id is not supported.
    pub fn initialize(&mut self) -> Result<u8> {
        if !self.prog.check() {
            return Err(Error::Unreachable);
        }

        self.prog.halt().during("halt chip")?;
        sleep(init::HALT_SETTLE);

        self.prog
            .write_ar(registers::DEVICEID)
            .during("select device id register")?;
        let id = self.prog.read_dr().during("read chip id")?;
        log::info!("Found chip: 0x{:02x}", id);

        if id != SUPPORTED_DEVICE_ID {
            return Err(Error::UnsupportedDevice(id));
        }

        let (addr, data) = init::FLASH_TIMING;
        self.prog
            .write_sfr(addr, data)
            .during("chip init - flash timing")?;
        let (addr, data) = init::VDD_MONITOR_1;
        self.prog
            .write_sfr(addr, data)
            .during("chip init - vdd mon 1")?;
        sleep(init::VDD_MONITOR_SETTLE);
        let (addr, data) = init::VDD_MONITOR_2;
        self.prog
            .write_sfr(addr, data)
            .during("chip init - vdd mon 2")?;
        let (addr, data) = init::OSCILLATOR;
        self.prog.write_sfr(addr, data).during("chip init - osc")?;

        sleep(init::READY_SETTLE);
        Ok(id)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.prog.reset().during("reset chip")
    }

    /// Read the identification registers without halting the chip.
    pub fn chip_info(&mut self) -> Result<ChipInfo> {
        if !self.prog.check() {
            return Err(Error::Unreachable);
        }
        self.reset()?;

        let device_id = self.prog.read_dr().during("read chip id")?;
        let revision_id = self
            .prog
            .read_sfr(registers::REVID)
            .during("read revision id")?;
        let secondary_id = self
            .prog
            .read_sfr(registers::DEVICEID)
            .during("read second chip id")?;

        Ok(ChipInfo {
            device_id,
            revision_id,
            secondary_id,
        })
    }

    /// Write the address register and read it back.
    pub fn self_test(&mut self) -> Result<()> {
        const PATTERN: u8 = 0x01;

        if !self.prog.check() {
            return Err(Error::Unreachable);
        }
        self.reset()?;

        self.prog
            .write_ar(PATTERN)
            .during("write the address register")?;
        let actual = self
            .prog
            .read_ar()
            .during("read the address register")?;
        if actual != PATTERN {
            return Err(Error::AddressRegisterMismatch {
                expected: PATTERN,
                actual,
            });
        }
        Ok(())
    }

    pub fn erase_page(&mut self, page: u8) -> Result<()> {
        log::debug!("erasing page {}", page);

        self.start(commands::PAGE_ERASE, "page erase")?;

        self.prog
            .write_command(page)
            .during("page erase: page number")?;
        self.expect_ack("page erase: page number")?;

        self.prog
            .write_command(0x00)
            .during("page erase: confirm")?;
        self.expect_ack("page erase: confirm")
    }

    /// Write up to [`BLOCK_SIZE`] bytes starting at `addr`.
    pub fn write_block(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > BLOCK_SIZE {
            return Err(Error::InvalidBlockLength(data.len()));
        }
        log::debug!("writing block 0x{:04x}, {} bytes", addr, data.len());

        self.start(commands::BLOCK_WRITE, "block write")?;

        let [hi, lo] = addr.to_be_bytes();
        for byte in [hi, lo, data.len() as u8] {
            self.prog
                .write_command(byte)
                .during("block write: address")?;
        }
        for &byte in data {
            self.prog.write_command(byte).during("block write: data")?;
        }

        self.expect_ack("block write: data")
    }

    /// Read `len` (at most [`BLOCK_SIZE`]) bytes starting at `addr`.
    pub fn read_block(&mut self, addr: u16, len: usize) -> Result<Vec<u8>> {
        if len == 0 || len > BLOCK_SIZE {
            return Err(Error::InvalidBlockLength(len));
        }
        log::debug!("reading block 0x{:04x}, {} bytes", addr, len);

        self.start(commands::BLOCK_READ, "block read")?;

        let [hi, lo] = addr.to_be_bytes();
        for byte in [hi, lo, len as u8] {
            self.prog
                .write_command(byte)
                .during("block read: address")?;
        }
        self.expect_ack("block read: address")?;

        let mut buf = Vec::with_capacity(len);
        for _ in 0..len {
            buf.push(self.prog.read_data().during("block read: data")?);
        }
        Ok(buf)
    }

    /// Select FPDAT, issue `cmd` and wait for it to be accepted.
    fn start(&mut self, cmd: u8, step: &'static str) -> Result<()> {
        self.prog.write_ar(FPDAT).during(step)?;
        self.prog.write_command(cmd).during(step)?;
        self.expect_ack(step)
    }

    fn expect_ack(&mut self, step: &'static str) -> Result<()> {
        let actual = self.prog.read_data().during(step)?;
        if actual != ACK {
            return Err(Error::ProtocolAck {
                step,
                expected: ACK,
                actual,
            });
        }
        Ok(())
    }
}
