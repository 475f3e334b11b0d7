//! Connect → sync → erase → program orchestration.
//!
//! The boot ROM only listens for a short window after reset, so the whole
//! command sequence runs inside a polling retry loop: every iteration starts
//! over from `connect`, and a retry-eligible failure anywhere in the
//! sequence (silent device, garbled acknowledgement) sleeps briefly and
//! tries again until the caller's time budget runs out. The budget is
//! measured against real elapsed time, not loop counts.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::port::Port;
use crate::session::IspSession;

/// Pause between retry iterations of the connect/program sequence.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// What to run after programming completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum RunTarget {
    /// Reset the device.
    Reset,
    /// Jump to the application ROM.
    Aprom,
    /// Jump to the loader ROM.
    Ldrom,
}

/// Options for one [`flash`] call.
#[derive(Debug, Clone)]
pub struct FlashOptions {
    /// Erase all of APROM before programming.
    pub erase_all: bool,
    /// Command to leave ISP mode with, if any. When several are requested
    /// the caller resolves priority: reset, else run-APROM, else run-LDROM.
    pub run: Option<RunTarget>,
    /// Total time budget for the retry loop.
    pub budget: Duration,
    /// Query the device id during the sequence.
    pub query_device_id: bool,
    /// Query the boot ROM firmware version during the sequence.
    pub query_firmware_version: bool,
    /// Query the config words during the sequence.
    pub query_config: bool,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            erase_all: false,
            run: None,
            budget: Duration::from_millis(1000),
            query_device_id: false,
            query_firmware_version: false,
            query_config: false,
        }
    }
}

/// Outcome of a successful [`flash`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashReport {
    /// Device id, if queried.
    pub device_id: Option<u32>,
    /// Boot ROM firmware version, if queried.
    pub firmware_version: Option<u8>,
    /// Config words, if queried.
    pub config_words: Option<(u32, u32)>,
    /// Whether a mass erase ran.
    pub erased: bool,
    /// Whether the image was programmed to completion.
    pub programmed: bool,
    /// Number of sequence iterations it took.
    pub attempts: u32,
}

/// Drive the full programming sequence with a bounded retry budget.
///
/// `progress` receives `(bytes_transmitted, total_bytes)` while the image
/// uploads; a retried iteration restarts it from zero.
pub fn flash<P, F>(
    session: &mut IspSession<P>,
    image: &FirmwareImage,
    address: u32,
    options: &FlashOptions,
    mut progress: F,
) -> Result<FlashReport>
where
    P: Port,
    F: FnMut(usize, usize),
{
    let start = Instant::now();
    let mut attempts = 0u32;

    while start.elapsed() < options.budget {
        attempts += 1;
        match attempt(session, image, address, options, &mut progress) {
            Ok(mut report) => {
                report.attempts = attempts;
                info!("device programmed after {attempts} attempt(s)");
                return Ok(report);
            }
            Err(e) if e.is_retryable() => {
                debug!("attempt {attempts} failed: {e}");
                thread::sleep(RETRY_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }

    warn!(
        "device never reached the programmed state within {:?}",
        options.budget
    );
    Err(Error::BudgetExhausted {
        budget: options.budget,
    })
}

/// One pass through the command sequence, starting from `connect`.
fn attempt<P, F>(
    session: &mut IspSession<P>,
    image: &FirmwareImage,
    address: u32,
    options: &FlashOptions,
    progress: &mut F,
) -> Result<FlashReport>
where
    P: Port,
    F: FnMut(usize, usize),
{
    let mut report = FlashReport::default();

    if !session.connect()? {
        return Err(Error::Timeout("no response to connect".into()));
    }
    session.sync()?;

    if options.query_firmware_version {
        report.firmware_version = Some(session.read_firmware_version()?);
    }
    if options.query_device_id {
        report.device_id = Some(session.read_device_id()?);
    }
    if options.query_config {
        report.config_words = Some(session.read_config()?);
    }

    if options.erase_all {
        session.erase_all()?;
        report.erased = true;
    }
    // The erase invalidates the package-number contract; resynchronize
    // before programming either way.
    session.sync()?;

    session.program(image, address, |sent, total| progress(sent, total))?;
    report.programmed = true;

    match options.run {
        Some(RunTarget::Reset) => session.reset()?,
        Some(RunTarget::Aprom) => session.run_aprom()?,
        Some(RunTarget::Ldrom) => session.run_ldrom()?,
        None => {}
    }

    Ok(report)
}
