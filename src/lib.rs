//! C2 programmer for 8051 based Silicon Labs chips.

pub mod constants;
pub mod device;
pub mod error;
pub mod flashing;
pub mod format;
pub mod programmer;
pub mod protocol;
pub mod transport;

pub use self::device::{ChipInfo, Device};
pub use self::error::{Error, Mismatch, TransportError};
pub use self::flashing::{FlashOptions, FlashReport, Flashing, ProgressCallbacks, VerifyPolicy};
pub use self::programmer::Programmer;
pub use self::protocol::{Frame, Opcode};
pub use self::transport::{LinkConfig, Transport};
