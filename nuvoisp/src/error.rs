//! Error types for nuvoisp.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for nuvoisp operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for nuvoisp operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No response, or an incomplete one, within the configured window.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Response checksum disagrees with the transmitted packet.
    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Checksum of the packet as transmitted.
        expected: u16,
        /// Checksum carried by the response.
        actual: u16,
    },

    /// Echoed package number disagrees with the transmitted packet.
    #[error("Package number mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Package number the boot ROM was expected to echo.
        expected: u32,
        /// Package number the response actually carried.
        actual: u32,
    },

    /// Response too short to carry a checksum and package number.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A command was issued before the boot ROM accepted a connection.
    #[error("Not connected to the boot ROM")]
    NotConnected,

    /// The connect/program retry budget elapsed.
    #[error("Retry budget of {budget:?} exhausted")]
    BudgetExhausted {
        /// The caller-supplied budget that elapsed.
        budget: Duration,
    },

    /// Firmware image could not be read.
    #[error("Firmware image error: {0}")]
    Image(String),
}

impl Error {
    /// Whether the outer retry loop may attempt the sequence again.
    ///
    /// Transport timeouts and response-validation failures are recovered by
    /// reissuing the whole sequence from `connect`; everything else is
    /// terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::ChecksumMismatch { .. }
                | Self::SequenceMismatch { .. }
                | Self::InvalidResponse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout("no response".into()).is_retryable());
        assert!(
            Error::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .is_retryable()
        );
        assert!(
            Error::SequenceMismatch {
                expected: 2,
                actual: 4
            }
            .is_retryable()
        );
        assert!(Error::InvalidResponse("3 bytes".into()).is_retryable());

        assert!(!Error::NotConnected.is_retryable());
        assert!(
            !Error::BudgetExhausted {
                budget: Duration::from_millis(1000)
            }
            .is_retryable()
        );
        assert!(!Error::Image("missing".into()).is_retryable());
    }
}
