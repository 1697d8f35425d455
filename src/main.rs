use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use c2prog::{
    FlashOptions, Flashing, LinkConfig, ProgressCallbacks, Transport, VerifyPolicy,
    constants::FLASH_SIZE,
    format::read_firmware_from_file,
    transport::{DEFAULT_BAUDRATE, DEFAULT_DEVICE_PATH, DEFAULT_PORT},
};

#[derive(Parser)]
#[command(
    name = "c2prog",
    about = "c2prog - Programmer for the C2 protocol of 8051 based Silicon Labs chips"
)]
struct Cli {
    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// How the programmer is attached
    #[arg(long, value_enum, default_value_t = Link::Kernel, global = true)]
    transport: Link,

    /// Character device of the c2prog kernel module
    #[arg(long, default_value = DEFAULT_DEVICE_PATH, global = true)]
    device: PathBuf,

    /// Serial port of the programmer
    #[arg(short, long, default_value = DEFAULT_PORT, global = true)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUDRATE, global = true)]
    baud: u32,

    /// Time to wait for each reply, in milliseconds
    #[arg(long, default_value_t = 1000, global = true)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Link {
    /// c2prog kernel module on GPIO pins
    Kernel,
    /// Serial attached bridge controller
    Serial,
}

#[derive(Subcommand)]
enum Command {
    /// Erase the first page of the device
    Erase,
    /// Flash a new firmware to the device
    Flash {
        /// Firmware file (binary, Intel HEX or plain hex)
        #[arg(long = "fw", default_value = "fw.bin")]
        firmware: PathBuf,
        /// Do not erase the pages covered by the firmware before writing
        #[arg(long)]
        no_auto_erase: bool,
        /// Only warn about bytes that fail verification
        #[arg(long)]
        verify_warn_only: bool,
    },
    /// Information about the target chip
    Info,
    /// Read the content of the flash of the device
    Read {
        /// Output file
        #[arg(long = "fw", default_value = "fw.bin")]
        file: PathBuf,
    },
    /// Write and read back the address register
    Test,
}

impl Cli {
    fn link_config(&self) -> LinkConfig {
        let timeout = Duration::from_millis(self.timeout_ms);
        match self.transport {
            Link::Kernel => LinkConfig::Kernel {
                path: self.device.clone(),
                timeout,
            },
            Link::Serial => LinkConfig::Serial {
                port: self.port.clone(),
                baudrate: self.baud,
                timeout,
            },
        }
    }
}

#[derive(Default)]
struct BarProgress {
    bar: Option<ProgressBar>,
}

impl ProgressCallbacks for BarProgress {
    fn init(&mut self, phase: &'static str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg:>10} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_message(phase);
        self.bar = Some(pb);
    }

    fn update(&mut self, current: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(current as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    log::debug!("Debug logging enabled");

    let transport = cli
        .link_config()
        .open()
        .context("Failed to open the programmer port")?;
    let mut flashing = Flashing::new(transport);

    let result = run(&mut flashing, cli.command);

    if let Err(e) = flashing.close() {
        log::warn!("Failed to close programmer port: {}", e);
    }
    result
}

fn run<T: Transport>(flashing: &mut Flashing<T>, command: Command) -> Result<()> {
    match command {
        Command::Erase => {
            flashing.erase_first_page()?;
        }
        Command::Flash {
            firmware,
            no_auto_erase,
            verify_warn_only,
        } => {
            let binary = read_firmware_from_file(&firmware)
                .with_context(|| format!("failed to read firmware file {}", firmware.display()))?;
            let options = FlashOptions {
                erase: !no_auto_erase,
                verify: if verify_warn_only {
                    VerifyPolicy::Warn
                } else {
                    VerifyPolicy::Fail
                },
            };
            let report = flashing.flash(&binary, &options, &mut BarProgress::default())?;
            if report.mismatches.is_empty() {
                log::info!("Flashed and verified {} bytes", report.image_len);
            } else {
                log::warn!(
                    "Flashed {} bytes, {} byte(s) failed verification",
                    report.image_len,
                    report.mismatches.len()
                );
            }
        }
        Command::Info => {
            let info = flashing.device_mut().chip_info()?;
            log::info!("{}", info);
        }
        Command::Read { file } => {
            let data = flashing.read_flash(FLASH_SIZE, &mut BarProgress::default())?;
            std::fs::write(&file, &data)
                .with_context(|| format!("failed to write {}", file.display()))?;
            log::info!("Wrote {} bytes to {}", data.len(), file.display());
        }
        Command::Test => {
            flashing.device_mut().self_test()?;
            log::info!("Address register read back correctly");
        }
    }

    Ok(())
}
