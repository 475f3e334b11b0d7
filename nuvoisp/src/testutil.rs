//! Scripted serial port for protocol, session and upload tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;
use crate::protocol::packet::{PACKET_LEN, Packet, SEQUENCE_OFFSET};

/// Mock serial port with a queue of scripted responses.
///
/// Each queued response models one boot ROM reply; a read against an empty
/// queue fails with `TimedOut`, the same way a silent device does. Queue an
/// empty reply to model a boot ROM that stayed silent for one command.
pub(crate) struct MockPort {
    responses: VecDeque<Vec<u8>>,
    pending: VecDeque<u8>,
    pub(crate) written: Vec<u8>,
    timeout: Duration,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            pending: VecDeque::new(),
            written: Vec::new(),
            timeout: Duration::from_millis(500),
        }
    }

    /// Queue one scripted reply.
    pub(crate) fn push_response(&mut self, bytes: &[u8]) {
        self.responses.push_back(bytes.to_vec());
    }

    /// Number of complete 64-byte frames written so far.
    pub(crate) fn packets_written(&self) -> usize {
        self.written.len() / PACKET_LEN
    }

    /// The `n`-th written 64-byte frame.
    pub(crate) fn written_packet(&self, n: usize) -> &[u8] {
        &self.written[n * PACKET_LEN..(n + 1) * PACKET_LEN]
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.responses.pop_front() {
                Some(next) if !next.is_empty() => self.pending.extend(next),
                // A queued empty reply, or nothing queued at all.
                _ => return Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }

        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().expect("pending byte");
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build the boot ROM acknowledgement for a transmitted frame: checksum of
/// the frame at bytes 0..2, its package number plus one at bytes 4..8, and
/// any result fields on top.
pub(crate) fn ack_for(packet: &Packet, fields: &[(usize, &[u8])]) -> Vec<u8> {
    let mut resp = vec![0u8; PACKET_LEN];
    resp[..2].copy_from_slice(&packet.checksum().to_le_bytes());
    resp[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4]
        .copy_from_slice(&packet.sequence().wrapping_add(1).to_le_bytes());
    for (offset, bytes) in fields {
        resp[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    }
    resp
}
