//! # nuvoisp
//!
//! A library for programming Nuvoton MCUs over the ISP boot ROM serial
//! protocol.
//!
//! This crate provides the core functionality for talking to a Nuvoton ISP
//! boot ROM over a serial port, including:
//!
//! - The fixed 64-byte, checksum-verified packet codec
//! - Package-number tracking and resynchronization
//! - Connect / query / erase / program / run command execution
//! - The chunked APROM upload sequence
//! - A bounded-retry driver for the whole connect → program sequence
//!
//! ## Supported platforms
//!
//! Linux, macOS and Windows via the `serialport` crate.
//!
//! ## Features
//!
//! - `serde`: Serialization support for report types
//!
//! ## Example
//!
//! ```rust,no_run
//! use nuvoisp::{FirmwareImage, FlashOptions, IspSession, RunTarget};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Read the raw firmware binary
//!     let image = FirmwareImage::from_file("firmware.bin")?;
//!
//!     // One session per serial port; the baud rate is fixed by the ROM
//!     let mut session = IspSession::open("/dev/ttyUSB0")?;
//!
//!     let options = FlashOptions {
//!         erase_all: true,
//!         run: Some(RunTarget::Aprom),
//!         budget: Duration::from_millis(1000),
//!         ..Default::default()
//!     };
//!
//!     let report = nuvoisp::flash(&mut session, &image, 0x0, &options, |sent, total| {
//!         println!("programming: {sent}/{total}");
//!     })?;
//!
//!     println!("done after {} attempt(s)", report.attempts);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod image;
pub mod loader;
pub mod port;
pub mod protocol;
pub mod session;
pub mod transport;

mod upload;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenience
pub use {
    error::{Error, Result},
    image::FirmwareImage,
    loader::{FlashOptions, FlashReport, RETRY_INTERVAL, RunTarget, flash},
    port::{NativePort, NativePortEnumerator, Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Command, PACKET_LEN, Packet, SequenceTracker},
    session::{ERASE_SETTLE_DELAY, IspSession},
    transport::{
        BAUD_RATE, CONNECT_TIMEOUT, DEFAULT_TIMEOUT, ERASE_TIMEOUT, PROGRAM_TIMEOUT, Transport,
    },
};
