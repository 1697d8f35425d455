//! Firmware file formats
use std::path::Path;
use std::str;

use anyhow::Result;

use crate::constants::{FLASH_SIZE, PAD_BYTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareFormat {
    PlainHex,
    IntelHex,
    Binary,
}

pub fn read_firmware_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    let format = guess_format(p, &raw);
    log::info!("Read {} as {:?} format", p.display(), format);
    match format {
        FirmwareFormat::PlainHex => read_hex(str::from_utf8(&raw)?),
        FirmwareFormat::IntelHex => read_ihex(str::from_utf8(&raw)?),
        FirmwareFormat::Binary => Ok(raw),
    }
}

pub fn guess_format(path: &Path, raw: &[u8]) -> FirmwareFormat {
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .to_lowercase();
    // SDCC writes Intel HEX as .ihx
    if ["ihex", "ihx", "ihe", "h86", "hex", "a43", "a90"].contains(&&*ext) {
        return FirmwareFormat::IntelHex;
    }

    if raw.is_empty() {
        FirmwareFormat::Binary
    } else if raw[0] == b':'
        && raw
            .iter()
            .all(|&c| c.is_ascii_hexdigit() || c == b':' || c == b'\n' || c == b'\r')
    {
        FirmwareFormat::IntelHex
    } else if raw
        .iter()
        .all(|&c| c.is_ascii_hexdigit() || c.is_ascii_whitespace())
    {
        FirmwareFormat::PlainHex
    } else {
        FirmwareFormat::Binary
    }
}

pub fn read_hex(data: &str) -> Result<Vec<u8>> {
    let digits: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(hex::decode(digits)?)
}

/// Flatten an Intel HEX file into an image starting at address 0.
///
/// Records must lie inside the code flash, gaps read as erased flash.
pub fn read_ihex(data: &str) -> Result<Vec<u8>> {
    use ihex::Record;

    let mut base = 0usize;
    let mut image = Vec::new();
    for record in ihex::Reader::new(data) {
        match record? {
            Record::Data { offset, value } => {
                let start = base + offset as usize;
                let end = start + value.len();
                anyhow::ensure!(
                    end <= FLASH_SIZE,
                    "hex record at 0x{:x} ends beyond the {} byte code flash",
                    start,
                    FLASH_SIZE
                );
                if image.len() < end {
                    image.resize(end, PAD_BYTE);
                }
                image[start..end].copy_from_slice(&value);
            }
            Record::ExtendedSegmentAddress(segment) => base = segment as usize * 16,
            Record::ExtendedLinearAddress(upper) => base = (upper as usize) << 16,
            _ => (),
        }
    }
    anyhow::ensure!(!image.is_empty(), "firmware contains no data");
    Ok(image)
}
