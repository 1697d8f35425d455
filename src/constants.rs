//! Magic numbers of the C2 interface and the supported EFM8 target.

/// Size of the flash transfer granule used by block read/write.
pub const BLOCK_SIZE: usize = 128;
/// Erase granularity of the code flash.
pub const PAGE_SIZE: usize = 512;
/// Code flash size of the supported 8 KiB device.
pub const FLASH_SIZE: usize = 8192;

/// Erased flash reads back as this value, so images are padded with it.
pub const PAD_BYTE: u8 = 0xFF;

/// Device ID reported in the C2 DEVICEID register by the EFM8 target.
pub const SUPPORTED_DEVICE_ID: u8 = 0x34;

/// The flash programming data register. Hard-coded for the EFM8.
pub const FPDAT: u8 = 0xB4;

/// Returned by the flash sub-protocol at every successful checkpoint.
pub const ACK: u8 = 0x0D;

/// C2 register addresses.
pub mod registers {
    pub const DEVICEID: u8 = 0x00;
    pub const REVID: u8 = 0x01;
}

/// Flash sub-protocol commands, written via `WriteCommand` once the address
/// register selects FPDAT.
pub mod commands {
    pub const GET_VERSION: u8 = 0x01;
    pub const GET_DERIVATIVE: u8 = 0x02;
    pub const DEVICE_ERASE: u8 = 0x03;
    pub const BLOCK_READ: u8 = 0x06;
    pub const BLOCK_WRITE: u8 = 0x07;
    pub const PAGE_ERASE: u8 = 0x08;
    pub const DIRECT_READ: u8 = 0x09;
    pub const DIRECT_WRITE: u8 = 0x0A;
    pub const INDIRECT_READ: u8 = 0x0B;
    pub const INDIRECT_WRITE: u8 = 0x0C;
}

/// SFR writes that prepare the EFM8 for flash programming (AN127).
pub mod init {
    use std::time::Duration;

    /// Flash timing.
    pub const FLASH_TIMING: (u8, u8) = (0xB6, 0x40);
    /// VDD monitor enable, first step.
    pub const VDD_MONITOR_1: (u8, u8) = (0xFF, 0x80);
    /// VDD monitor enable, second step.
    pub const VDD_MONITOR_2: (u8, u8) = (0xEF, 0x02);
    /// Oscillator select.
    pub const OSCILLATOR: (u8, u8) = (0xA9, 0x00);

    /// Wait after halting before the DEVICEID register can be read.
    pub const HALT_SETTLE: Duration = Duration::from_millis(50);
    /// Wait between the two VDD monitor writes.
    pub const VDD_MONITOR_SETTLE: Duration = Duration::from_micros(5);
    /// Wait after the init writes before flash commands are accepted.
    pub const READY_SETTLE: Duration = Duration::from_millis(50);
    /// Wait between erasing and writing.
    pub const ERASE_SETTLE: Duration = Duration::from_millis(100);
}
