//! An in-memory EFM8 behind a C2 programmer, for tests.
//!
//! Models the FPDAT flash sub-protocol against an 8 KiB flash array and
//! records every frame it receives. Faults can be injected per instance.

use std::{collections::VecDeque, io};

use super::Transport;
use crate::{
    constants::{ACK, FLASH_SIZE, FPDAT, PAGE_SIZE, SUPPORTED_DEVICE_ID, commands, registers},
    error::TransportError,
    protocol::{FRAME_SIZE, Frame, Opcode},
};

struct Session {
    cmd: u8,
    args: Vec<u8>,
}

pub struct SimTarget {
    device_id: u8,
    revision_id: u8,
    reachable: bool,
    flash: Vec<u8>,
    sfr: [u8; 256],
    ar: u8,
    session: Option<Session>,
    out: VecDeque<u8>,
    reply: Option<[u8; FRAME_SIZE]>,
    closed: bool,

    frames: Vec<Frame>,
    erased_pages: Vec<u8>,
    block_writes: Vec<(u16, usize)>,
    block_reads: Vec<(u16, usize)>,

    acks_sent: usize,
    /// Replace the nth acknowledgement with this value.
    bad_ack: Option<(usize, u8)>,
    /// Return this value instead of the stored byte when reading this offset.
    corrupt_read: Option<(usize, u8)>,
    /// Fail every send after this many frames.
    fail_after: Option<usize>,
}

impl SimTarget {
    pub fn new() -> Self {
        SimTarget {
            device_id: SUPPORTED_DEVICE_ID,
            revision_id: 0x02,
            reachable: true,
            flash: vec![0xFF; FLASH_SIZE],
            sfr: [0; 256],
            ar: 0,
            session: None,
            out: VecDeque::new(),
            reply: None,
            closed: false,
            frames: Vec::new(),
            erased_pages: Vec::new(),
            block_writes: Vec::new(),
            block_reads: Vec::new(),
            acks_sent: 0,
            bad_ack: None,
            corrupt_read: None,
            fail_after: None,
        }
    }

    pub fn with_device_id(mut self, id: u8) -> Self {
        self.device_id = id;
        self
    }

    pub fn with_flash(mut self, contents: &[u8]) -> Self {
        self.flash[..contents.len()].copy_from_slice(contents);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn with_bad_ack(mut self, nth: usize, value: u8) -> Self {
        self.bad_ack = Some((nth, value));
        self
    }

    pub fn with_read_corruption(mut self, offset: usize, value: u8) -> Self {
        self.corrupt_read = Some((offset, value));
        self
    }

    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn count(&self, op: Opcode) -> usize {
        self.frames.iter().filter(|f| f.op == op as u8).count()
    }

    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    pub fn sfr(&self, addr: u8) -> u8 {
        self.sfr[addr as usize]
    }

    pub fn erased_pages(&self) -> &[u8] {
        &self.erased_pages
    }

    pub fn block_writes(&self) -> &[(u16, usize)] {
        &self.block_writes
    }

    pub fn block_reads(&self) -> &[(u16, usize)] {
        &self.block_reads
    }

    fn handle(&mut self, req: Frame) -> Frame {
        let Some(op) = req.opcode() else {
            return Frame::default();
        };
        let mut resp = req;
        match op {
            Opcode::Ping if !self.reachable => return Frame::default(),
            Opcode::Ping => resp.op = Opcode::Pong as u8,
            Opcode::Reset => {
                self.ar = 0;
                self.session = None;
                self.out.clear();
            }
            Opcode::WriteAddressRegister => self.ar = req.data,
            Opcode::ReadAddressRegister => resp.data = self.ar,
            Opcode::ReadDataRegister => resp.data = self.register(self.ar),
            Opcode::ReadSfr => resp.data = self.register(req.data),
            Opcode::WriteSfr => self.sfr[req.data as usize] = req.data2,
            Opcode::WriteCommand if self.ar == FPDAT => self.flash_command(req.data),
            Opcode::ReadData | Opcode::ReadResponse => {
                resp.data = self.out.pop_front().unwrap_or(0)
            }
            Opcode::ReadDeviceId => resp.data = self.device_id,
            _ => (),
        }
        resp
    }

    fn register(&self, addr: u8) -> u8 {
        match addr {
            registers::DEVICEID => self.device_id,
            registers::REVID => self.revision_id,
            other => self.sfr[other as usize],
        }
    }

    fn ack(&mut self) {
        let value = match self.bad_ack {
            Some((nth, value)) if nth == self.acks_sent => value,
            _ => ACK,
        };
        self.acks_sent += 1;
        self.out.push_back(value);
    }

    fn flash_command(&mut self, byte: u8) {
        match self.session.take() {
            None => match byte {
                commands::PAGE_ERASE
                | commands::BLOCK_WRITE
                | commands::BLOCK_READ
                | commands::DIRECT_READ
                | commands::DIRECT_WRITE => {
                    self.session = Some(Session {
                        cmd: byte,
                        args: Vec::new(),
                    });
                    self.ack();
                }
                _ => self.out.push_back(0x01),
            },
            Some(mut session) => {
                session.args.push(byte);
                if !self.advance(&session) {
                    self.session = Some(session);
                }
            }
        }
    }

    /// Returns true once the session is complete.
    fn advance(&mut self, session: &Session) -> bool {
        let args = &session.args;
        match session.cmd {
            commands::PAGE_ERASE => match args.len() {
                1 => {
                    self.ack();
                    false
                }
                _ => {
                    let page = args[0];
                    let start = page as usize * PAGE_SIZE;
                    if start < FLASH_SIZE {
                        self.flash[start..start + PAGE_SIZE].fill(0xFF);
                    }
                    self.erased_pages.push(page);
                    self.ack();
                    true
                }
            },
            commands::BLOCK_WRITE => {
                if args.len() < 3 || args.len() < 3 + block_len(args[2]) {
                    return false;
                }
                let addr = u16::from_be_bytes([args[0], args[1]]);
                let data = &args[3..];
                for (i, b) in data.iter().enumerate() {
                    if let Some(cell) = self.flash.get_mut(addr as usize + i) {
                        *cell &= b;
                    }
                }
                self.block_writes.push((addr, data.len()));
                self.ack();
                true
            }
            commands::BLOCK_READ => {
                if args.len() < 3 {
                    return false;
                }
                let addr = u16::from_be_bytes([args[0], args[1]]);
                let len = block_len(args[2]);
                self.block_reads.push((addr, len));
                self.ack();
                for offset in addr as usize..addr as usize + len {
                    let byte = match self.corrupt_read {
                        Some((at, value)) if at == offset => value,
                        _ => self.flash.get(offset).copied().unwrap_or(0xFF),
                    };
                    self.out.push_back(byte);
                }
                true
            }
            commands::DIRECT_READ => {
                if args.len() < 2 {
                    return false;
                }
                let value = self.sfr[args[0] as usize];
                self.out.push_back(value);
                true
            }
            commands::DIRECT_WRITE => {
                if args.len() < 3 {
                    return false;
                }
                self.sfr[args[0] as usize] = args[2];
                true
            }
            _ => true,
        }
    }
}

fn block_len(byte: u8) -> usize {
    if byte == 0 { 256 } else { byte as usize }
}

impl Transport for SimTarget {
    fn send_raw(&mut self, raw: &[u8; FRAME_SIZE]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.fail_after.is_some_and(|n| self.frames.len() >= n) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link dropped").into());
        }
        let req = Frame::from_raw(*raw);
        self.frames.push(req);
        let resp = self.handle(req);
        self.reply = Some(resp.into_raw());
        Ok(())
    }

    fn recv_raw(&mut self) -> Result<[u8; FRAME_SIZE], TransportError> {
        self.reply.take().ok_or(TransportError::ShortFrame(0))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;
        Ok(())
    }
}
