//! Chunked firmware upload.
//!
//! A firmware transfer is one `UpdateAprom` exchange stretched over many
//! frames. The opening frame spends 16 bytes on header fields and packs 48
//! firmware bytes after them; every following frame spends 8 bytes on the
//! package number and packs up to 56:
//!
//! ```text
//! Frame 1:  | A0 | .. | packno | address | length | data[0..48]  |
//! Frame 2+: | 00 | .. | packno |          data (up to 56 bytes)  |
//! ```
//!
//! A frame goes out the moment it is full, and after the image runs dry the
//! trailing frame (partially filled, or carrying no payload at all) is
//! zero-padded and flushed. The boot ROM acknowledges every frame with a
//! fixed 64-byte reply; only the final acknowledgement is validated, and it
//! decides whether the transfer succeeded.

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::port::Port;
use crate::protocol::packet::{Command, PACKET_LEN, Packet};
use crate::session::IspSession;
use crate::transport::{DEFAULT_TIMEOUT, PROGRAM_TIMEOUT};

/// Header bytes in the opening frame: command, package number, address,
/// total length.
const LEAD_HEADER_LEN: usize = 16;

/// Header bytes in every follow-up frame: package number only.
const DATA_HEADER_LEN: usize = 8;

/// The in-flight frame of one transfer, plus its fill position.
struct UploadCursor {
    buf: [u8; PACKET_LEN],
    fill: usize,
}

impl UploadCursor {
    /// Opening frame: `UpdateAprom` with start address and total length.
    fn lead(sequence: u32, address: u32, total: u32) -> Self {
        let mut frame = Packet::new(Command::UpdateAprom, sequence);
        frame.write_u32(8, address);
        frame.write_u32(12, total);
        Self {
            buf: *frame.bytes(),
            fill: LEAD_HEADER_LEN,
        }
    }

    /// Follow-up frame: package number header, no command byte.
    fn data(sequence: u32) -> Self {
        Self {
            buf: *Packet::data_frame(sequence).bytes(),
            fill: DATA_HEADER_LEN,
        }
    }

    fn push(&mut self, byte: u8) {
        self.buf[self.fill] = byte;
        self.fill += 1;
    }

    fn is_full(&self) -> bool {
        self.fill == PACKET_LEN
    }
}

impl<P: Port> IspSession<P> {
    /// Program a firmware image into APROM starting at `address`.
    ///
    /// `progress` is called with `(bytes_transmitted, total_bytes)` after
    /// each frame. A failed transfer is not resumable; the caller restarts
    /// the whole connect → sync → program sequence.
    #[allow(clippy::cast_possible_truncation)] // image length is bounded by flash size
    pub fn program<F>(
        &mut self,
        image: &FirmwareImage,
        address: u32,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        self.ensure_connected()?;
        self.transport.set_timeout(PROGRAM_TIMEOUT)?;
        let result = self.transfer(image, address, &mut progress);
        self.transport.set_timeout(DEFAULT_TIMEOUT)?;
        result
    }

    #[allow(clippy::cast_possible_truncation)]
    fn transfer<F>(&mut self, image: &FirmwareImage, address: u32, progress: &mut F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        let total = image.len();
        debug!("programming {total} bytes at {address:#010x}");

        let mut cursor = UploadCursor::lead(self.sequence.next(), address, total as u32);
        self.sequence.commit();

        let mut sent = 0usize;
        let mut pending = 0usize;

        for &byte in image.bytes() {
            cursor.push(byte);
            pending += 1;
            if cursor.is_full() {
                self.flush_acknowledged(&cursor)?;
                sent += pending;
                pending = 0;
                progress(sent, total);
                cursor = UploadCursor::data(self.sequence.next());
                self.sequence.commit();
            }
        }

        // The trailing frame always goes out, zero padding and all, and its
        // acknowledgement decides the transfer.
        let last = Packet::from_bytes(cursor.buf);
        self.transport.write_packet(last.bytes())?;
        let response = self.transport.read_packet()?;
        if response.is_empty() {
            return Err(Error::Timeout("no acknowledgement for final frame".into()));
        }
        last.validate(&response)?;

        sent += pending;
        progress(sent, total);
        debug!("programming complete, {sent} bytes in flash");
        Ok(())
    }

    /// Transmit a full frame and wait for its fixed-size acknowledgement.
    ///
    /// Intermediate acknowledgements are not validated; the boot ROM keeps
    /// streaming as long as frames arrive in order.
    fn flush_acknowledged(&mut self, cursor: &UploadCursor) -> Result<()> {
        trace!("frame out, package number {}", Packet::from_bytes(cursor.buf).sequence());
        self.transport.write_packet(&cursor.buf)?;
        let ack = self.transport.read_packet()?;
        if ack.is_empty() {
            return Err(Error::Timeout("no acknowledgement for data frame".into()));
        }
        Ok(())
    }
}
