//! Transport adapter: byte movement and per-command timeout policy.
//!
//! The boot ROM answers most commands within a few milliseconds, but two
//! operations are slow on-device: a mass erase takes seconds, and each
//! programming frame waits on a flash row write. The protocol layer selects
//! the matching timeout class before every exchange; nothing in this module
//! interprets packet contents.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::packet::PACKET_LEN;

/// The single baud rate the boot ROM listens on.
pub const BAUD_RATE: u32 = 115_200;

/// Read timeout for ordinary commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Read timeout while polling for a connect acknowledgement.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(10);

/// Read timeout for the erase-all acknowledgement.
pub const ERASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read timeout for per-frame acknowledgements while programming.
pub const PROGRAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a [`Port`] with the two read strategies the protocol uses.
pub struct Transport<P: Port> {
    port: P,
}

impl<P: Port> Transport<P> {
    /// Wrap an open port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// The underlying port's name.
    pub fn name(&self) -> &str {
        self.port.name()
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Select the read timeout for the next exchange.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)
    }

    /// Discard any stale bytes on the link.
    pub fn clear(&mut self) -> Result<()> {
        self.port.clear_buffers()
    }

    /// Close the underlying port.
    pub fn close(&mut self) -> Result<()> {
        self.port.close()
    }

    /// Transmit one 64-byte frame.
    pub fn write_packet(&mut self, packet: &[u8; PACKET_LEN]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one reply the way the boot ROM terminates ordinary responses.
    ///
    /// Accumulates bytes until a newline, a full frame, or the timeout
    /// window closes. An empty result means the device stayed silent; that
    /// is reported as data, not as an error.
    pub fn read_line(&mut self) -> Result<Vec<u8>> {
        self.read_until(|bytes| bytes.contains(&b'\n') || bytes.len() >= PACKET_LEN)
    }

    /// Read one fixed-size 64-byte reply (programming acknowledgements).
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        self.read_until(|bytes| bytes.len() >= PACKET_LEN)
    }

    fn read_until<F>(&mut self, done: F) -> Result<Vec<u8>>
    where
        F: Fn(&[u8]) -> bool,
    {
        let deadline = Instant::now() + self.port.timeout();
        let mut bytes = Vec::with_capacity(PACKET_LEN);
        let mut chunk = [0u8; PACKET_LEN];

        loop {
            match self.port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    bytes.extend_from_slice(&chunk[..n]);
                    if done(&bytes) {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(Error::Io(e)),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        trace!("received {} bytes", bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockPort;

    #[test]
    fn test_write_packet_sends_all_64_bytes() {
        let mut transport = Transport::new(MockPort::new());
        let frame = [0xAAu8; PACKET_LEN];
        transport.write_packet(&frame).unwrap();
        assert_eq!(transport.port.written, frame);
    }

    #[test]
    fn test_read_line_returns_empty_when_silent() {
        let mut transport = Transport::new(MockPort::new());
        let bytes = transport.read_line().unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_read_line_collects_a_full_frame() {
        let mut port = MockPort::new();
        port.push_response(&[0x55u8; PACKET_LEN]);
        let mut transport = Transport::new(port);
        let bytes = transport.read_line().unwrap();
        assert_eq!(bytes.len(), PACKET_LEN);
    }

    #[test]
    fn test_read_line_stops_at_newline() {
        let mut port = MockPort::new();
        port.push_response(b"ok\nmore");
        let mut transport = Transport::new(port);
        let bytes = transport.read_line().unwrap();
        assert_eq!(bytes, b"ok\nmore");
    }

    #[test]
    fn test_read_packet_collects_exactly_one_frame() {
        let mut port = MockPort::new();
        port.push_response(&[0x11u8; PACKET_LEN]);
        port.push_response(&[0x22u8; PACKET_LEN]);
        let mut transport = Transport::new(port);

        let first = transport.read_packet().unwrap();
        assert_eq!(first, vec![0x11u8; PACKET_LEN]);

        let second = transport.read_packet().unwrap();
        assert_eq!(second, vec![0x22u8; PACKET_LEN]);
    }

    #[test]
    fn test_read_packet_returns_partial_on_timeout() {
        let mut port = MockPort::new();
        port.push_response(&[0x33u8; 10]);
        let mut transport = Transport::new(port);
        let bytes = transport.read_packet().unwrap();
        assert_eq!(bytes.len(), 10);
    }
}
