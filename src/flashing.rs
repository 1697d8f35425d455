//! Chip flashing logic.

use std::thread::sleep;

use crate::{
    constants::{BLOCK_SIZE, FLASH_SIZE, PAD_BYTE, PAGE_SIZE, init},
    device::Device,
    error::{Error, Mismatch, Result, TransportError},
    programmer::Programmer,
    transport::Transport,
};

/// Progress update callbacks
pub trait ProgressCallbacks {
    /// Start a phase covering `total` bytes
    fn init(&mut self, phase: &'static str, total: usize);
    /// Bytes done so far in the current phase
    fn update(&mut self, current: usize);
    /// Finish the current phase
    fn finish(&mut self);
}

/// Progress callbacks that do nothing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NoProgress;

impl ProgressCallbacks for NoProgress {
    fn init(&mut self, _phase: &'static str, _total: usize) {}
    fn update(&mut self, _current: usize) {}
    fn finish(&mut self) {}
}

/// What to do when the read-back differs from the image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum VerifyPolicy {
    /// Fail with [`Error::VerifyMismatch`].
    #[default]
    Fail,
    /// Log every mismatch and report them in [`FlashReport`].
    Warn,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashOptions {
    /// Erase the pages covered by the image before writing.
    pub erase: bool,
    pub verify: VerifyPolicy,
}

impl Default for FlashOptions {
    fn default() -> Self {
        FlashOptions {
            erase: true,
            verify: VerifyPolicy::Fail,
        }
    }
}

/// Outcome of a successful program-and-verify cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashReport {
    pub image_len: usize,
    pub padded_len: usize,
    pub pages_erased: usize,
    /// Empty unless verification ran with [`VerifyPolicy::Warn`].
    pub mismatches: Vec<Mismatch>,
}

/// Pad `image` with [`PAD_BYTE`] up to the next multiple of [`BLOCK_SIZE`].
pub fn pad_image(image: &[u8]) -> Vec<u8> {
    let mut padded = image.to_vec();
    padded.resize(image.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, PAD_BYTE);
    padded
}

/// Number of pages touched by `len` bytes starting at address 0.
pub fn page_count(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE)
}

/// Compare every byte, collecting all differences.
pub fn compare(expected: &[u8], actual: &[u8]) -> Vec<Mismatch> {
    expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter(|(_, (e, a))| e != a)
        .map(|(offset, (&expected, &actual))| Mismatch {
            offset,
            expected,
            actual,
        })
        .collect()
}

/// Drives whole-image operations against the target.
pub struct Flashing<T: Transport> {
    device: Device<T>,
}

impl<T: Transport> Flashing<T> {
    pub fn new(transport: T) -> Self {
        Flashing {
            device: Device::new(Programmer::new(transport)),
        }
    }

    pub fn device(&self) -> &Device<T> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<T> {
        &mut self.device
    }

    /// Release the link to the programmer.
    pub fn close(self) -> std::result::Result<(), TransportError> {
        self.device.into_programmer().close()
    }

    /// Erase the first page of the code flash.
    pub fn erase_first_page(&mut self) -> Result<()> {
        self.device.initialize()?;
        self.device.erase_page(0)?;
        log::info!("Erased page 0");
        Ok(())
    }

    /// Program `image` at address 0 and read it back for verification.
    pub fn flash(
        &mut self,
        image: &[u8],
        options: &FlashOptions,
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<FlashReport> {
        let padded = pad_image(image);
        if padded.len() > FLASH_SIZE {
            return Err(Error::ImageTooLarge {
                size: image.len(),
                capacity: FLASH_SIZE,
            });
        }
        let pages = page_count(padded.len());
        log::info!(
            "Firmware size: {} bytes, padded to {} bytes ({} pages)",
            image.len(),
            padded.len(),
            pages
        );

        self.device.initialize()?;

        let pages_erased = if options.erase {
            self.erase_pages(pages, progress)?;
            sleep(init::ERASE_SETTLE);
            pages
        } else {
            0
        };

        self.write_image(&padded, progress)?;
        self.device.reset()?;

        // register contents are not trusted after programming
        self.device.initialize()?;
        let readback = self.read_range(padded.len(), "Verifying", progress)?;
        let mismatches = compare(&padded, &readback);
        for m in &mismatches {
            log::warn!("Verify failed at {}", m);
        }
        self.device.reset()?;

        if !mismatches.is_empty() && options.verify == VerifyPolicy::Fail {
            return Err(Error::VerifyMismatch(mismatches));
        }
        if mismatches.is_empty() {
            log::info!("Verified {} bytes", padded.len());
        }

        Ok(FlashReport {
            image_len: image.len(),
            padded_len: padded.len(),
            pages_erased,
            mismatches,
        })
    }

    /// Dump `len` bytes of code flash starting at address 0.
    pub fn read_flash(
        &mut self,
        len: usize,
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<Vec<u8>> {
        if len > FLASH_SIZE {
            return Err(Error::ImageTooLarge {
                size: len,
                capacity: FLASH_SIZE,
            });
        }
        self.device.initialize()?;
        self.read_range(len, "Reading", progress)
    }

    fn erase_pages(&mut self, pages: usize, progress: &mut dyn ProgressCallbacks) -> Result<()> {
        progress.init("Erasing", pages * PAGE_SIZE);
        // pages <= FLASH_SIZE / PAGE_SIZE, fits a byte
        for page in 0..pages {
            self.device.erase_page(page as u8)?;
            progress.update((page + 1) * PAGE_SIZE);
        }
        progress.finish();
        Ok(())
    }

    fn write_image(&mut self, padded: &[u8], progress: &mut dyn ProgressCallbacks) -> Result<()> {
        progress.init("Writing", padded.len());
        for (i, chunk) in padded.chunks(BLOCK_SIZE).enumerate() {
            let addr = i * BLOCK_SIZE;
            self.device.write_block(addr as u16, chunk)?;
            progress.update(addr + chunk.len());
        }
        progress.finish();
        Ok(())
    }

    fn read_range(
        &mut self,
        len: usize,
        phase: &'static str,
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<Vec<u8>> {
        progress.init(phase, len);
        let mut buf = Vec::with_capacity(len);
        while buf.len() < len {
            let addr = buf.len();
            let chunk = BLOCK_SIZE.min(len - addr);
            buf.extend(self.device.read_block(addr as u16, chunk)?);
            progress.update(buf.len());
        }
        progress.finish();
        Ok(buf)
    }
}
