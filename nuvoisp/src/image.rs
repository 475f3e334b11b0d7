//! Firmware image loading.
//!
//! The boot ROM programs raw binaries; the only property the protocol needs
//! is the byte length, so the image is read into memory once, up front, and
//! never reinterpreted.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};

/// An immutable firmware binary, read once before the upload begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Read a raw firmware binary from disk.
    ///
    /// Fails with [`Error::Image`] before any transport I/O is attempted.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data =
            fs::read(path).map_err(|e| Error::Image(format!("{}: {e}", path.display())))?;
        debug!("loaded firmware image {} ({} bytes)", path.display(), data.len());
        Ok(Self { data })
    }

    /// Wrap in-memory firmware bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw firmware bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}
