//! ISP packet codec.
//!
//! Every exchange with the boot ROM uses the same fixed-size frame:
//!
//! ```text
//! Request (64 bytes):
//! +-----+---------+----------------+------------------------+
//! | CMD | unused  | Package number |        Payload         |
//! +-----+---------+----------------+------------------------+
//! | 0   | 1..4    | 4..8 (LE u32)  | 8..  (zero padded)     |
//! +-----+---------+----------------+------------------------+
//!
//! Response (64 bytes):
//! +----------+---------+----------------+-------------------+
//! | Checksum | unused  | Package number |      Results      |
//! +----------+---------+----------------+-------------------+
//! | 0..2 LE  | 2..4    | 4..8 (LE u32)  | 8..               |
//! +----------+---------+----------------+-------------------+
//! ```
//!
//! The response checksum is the byte sum of the *request* as transmitted,
//! modulo 65536, and the echoed package number must be the request's value
//! plus one. Validation therefore always runs against the exact snapshot of
//! the frame that went onto the wire.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// On-wire length of every request and response frame.
pub const PACKET_LEN: usize = 64;

/// Offset of the little-endian package number in both directions.
pub const SEQUENCE_OFFSET: usize = 4;

/// Offset where command payload and response results begin.
pub const PAYLOAD_OFFSET: usize = 8;

/// Boot ROM command codes.
///
/// The full command table of the ISP boot ROM; the client does not issue all
/// of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Program APROM (header packet of a firmware upload).
    UpdateAprom = 0xA0,
    /// Program the config words.
    UpdateConfig = 0xA1,
    /// Read the two config words.
    ReadConfig = 0xA2,
    /// Erase all of APROM.
    EraseAll = 0xA3,
    /// Resynchronize the package number to a known baseline.
    SyncPackno = 0xA4,
    /// Read the boot ROM firmware version.
    GetFwVersion = 0xA6,
    /// Leave ISP mode and run the application ROM.
    RunAprom = 0xAB,
    /// Leave ISP mode and run the loader ROM.
    RunLdrom = 0xAC,
    /// Reset the device.
    Reset = 0xAD,
    /// Establish an ISP connection.
    Connect = 0xAE,
    /// Tear down an ISP connection.
    Disconnect = 0xAF,
    /// Read the device id.
    GetDeviceId = 0xB1,
    /// Program the data flash region.
    UpdateDataflash = 0xC3,
    /// Write an image checksum.
    WriteChecksum = 0xC9,
    /// Query the current flash boot mode.
    GetFlashMode = 0xCA,
    /// Ask the boot ROM to resend the last packet.
    ResendPacket = 0xFF,
}

/// A single request frame, held exactly as it is (or was) transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    buf: [u8; PACKET_LEN],
}

impl Packet {
    /// Build a command frame with the given package number.
    pub fn new(command: Command, sequence: u32) -> Self {
        let mut buf = [0u8; PACKET_LEN];
        buf[0] = command as u8;
        LittleEndian::write_u32(&mut buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4], sequence);
        Self { buf }
    }

    /// Build a firmware data frame: no command byte, package number only.
    ///
    /// Used for every upload packet after the `UpdateAprom` header packet.
    pub fn data_frame(sequence: u32) -> Self {
        let mut buf = [0u8; PACKET_LEN];
        LittleEndian::write_u32(&mut buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4], sequence);
        Self { buf }
    }

    /// Reconstruct a frame from raw bytes (upload engine flush path).
    pub fn from_bytes(buf: [u8; PACKET_LEN]) -> Self {
        Self { buf }
    }

    /// Write a little-endian u32 payload field at `offset`.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.buf[offset..offset + 4], value);
    }

    /// The command code byte.
    pub fn command_code(&self) -> u8 {
        self.buf[0]
    }

    /// The package number carried at bytes 4..8.
    pub fn sequence(&self) -> u32 {
        LittleEndian::read_u32(&self.buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4])
    }

    /// The full 64-byte frame.
    pub fn bytes(&self) -> &[u8; PACKET_LEN] {
        &self.buf
    }

    /// Byte sum of the frame modulo 65536.
    #[allow(clippy::cast_possible_truncation)] // sum of 64 bytes < 65536
    pub fn checksum(&self) -> u16 {
        let sum: u32 = self.buf.iter().map(|&b| u32::from(b)).sum();
        (sum % 65_536) as u16
    }

    /// Validate a boot ROM response against this transmitted frame.
    ///
    /// Checks, in order: minimum length, checksum over the transmitted bytes,
    /// echoed package number equal to ours plus one.
    pub fn validate(&self, response: &[u8]) -> Result<()> {
        if response.len() < PAYLOAD_OFFSET {
            return Err(Error::InvalidResponse(format!(
                "{} bytes, need at least {PAYLOAD_OFFSET}",
                response.len()
            )));
        }

        let expected = self.checksum();
        let actual = LittleEndian::read_u16(&response[..2]);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let expected_seq = self.sequence().wrapping_add(1);
        let echoed = LittleEndian::read_u32(&response[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4]);
        if echoed != expected_seq {
            return Err(Error::SequenceMismatch {
                expected: expected_seq,
                actual: echoed,
            });
        }

        Ok(())
    }
}

/// Read a little-endian u32 result field from a response.
pub fn read_u32_field(response: &[u8], offset: usize) -> Option<u32> {
    response
        .get(offset..offset + 4)
        .map(LittleEndian::read_u32)
}

/// Read a single-byte result field from a response.
pub fn read_u8_field(response: &[u8], offset: usize) -> Option<u8> {
    response.get(offset).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack_for(packet: &Packet) -> Vec<u8> {
        let mut resp = vec![0u8; PACKET_LEN];
        resp[..2].copy_from_slice(&packet.checksum().to_le_bytes());
        resp[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4]
            .copy_from_slice(&(packet.sequence() + 1).to_le_bytes());
        resp
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::UpdateAprom as u8, 0xA0);
        assert_eq!(Command::ReadConfig as u8, 0xA2);
        assert_eq!(Command::EraseAll as u8, 0xA3);
        assert_eq!(Command::SyncPackno as u8, 0xA4);
        assert_eq!(Command::GetFwVersion as u8, 0xA6);
        assert_eq!(Command::RunAprom as u8, 0xAB);
        assert_eq!(Command::RunLdrom as u8, 0xAC);
        assert_eq!(Command::Reset as u8, 0xAD);
        assert_eq!(Command::Connect as u8, 0xAE);
        assert_eq!(Command::GetDeviceId as u8, 0xB1);
    }

    #[test]
    fn test_encode_layout_round_trip() {
        let mut packet = Packet::new(Command::UpdateAprom, 0x01020304);
        packet.write_u32(PAYLOAD_OFFSET, 0xDEADBEEF);
        packet.write_u32(PAYLOAD_OFFSET + 4, 0x1000);

        let bytes = packet.bytes();
        assert_eq!(bytes.len(), PACKET_LEN);
        assert_eq!(bytes[0], 0xA0);
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..12], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&bytes[12..16], &[0x00, 0x10, 0x00, 0x00]);
        assert!(bytes[16..].iter().all(|&b| b == 0));

        assert_eq!(packet.command_code(), 0xA0);
        assert_eq!(packet.sequence(), 0x01020304);
        assert_eq!(read_u32_field(bytes, PAYLOAD_OFFSET), Some(0xDEADBEEF));
    }

    #[test]
    fn test_data_frame_has_no_command_byte() {
        let packet = Packet::data_frame(5);
        assert_eq!(packet.command_code(), 0x00);
        assert_eq!(packet.sequence(), 5);
    }

    #[test]
    fn test_checksum_is_byte_sum_mod_65536() {
        let packet = Packet::new(Command::Connect, 1);
        // 0xAE + 0x01, everything else zero.
        assert_eq!(packet.checksum(), 0x00AF);

        let mut packet = Packet::new(Command::UpdateAprom, 1);
        packet.write_u32(PAYLOAD_OFFSET, 0xFFFFFFFF);
        assert_eq!(packet.checksum(), 0xA0 + 1 + 4 * 0xFF);
    }

    #[test]
    fn test_validate_accepts_matching_response() {
        let packet = Packet::new(Command::Connect, 1);
        let resp = ack_for(&packet);
        assert!(packet.validate(&resp).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_checksum() {
        let packet = Packet::new(Command::Connect, 1);
        let mut resp = ack_for(&packet);
        resp[0] ^= 0xFF;
        assert!(matches!(
            packet.validate(&resp),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_package_number_even_with_good_checksum() {
        let packet = Packet::new(Command::ReadConfig, 3);
        let mut resp = ack_for(&packet);
        resp[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4].copy_from_slice(&6u32.to_le_bytes());
        assert!(matches!(
            packet.validate(&resp),
            Err(Error::SequenceMismatch {
                expected: 4,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_validate_rejects_short_response() {
        let packet = Packet::new(Command::Connect, 1);
        assert!(matches!(
            packet.validate(&[0xAF, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00]),
            Err(Error::InvalidResponse(_))
        ));
        assert!(matches!(
            packet.validate(&[]),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_result_field_readers() {
        let mut resp = vec![0u8; PACKET_LEN];
        resp[8..12].copy_from_slice(&0x00B11477u32.to_le_bytes());
        resp[12] = 0x2E;
        assert_eq!(read_u32_field(&resp, 8), Some(0x00B11477));
        assert_eq!(read_u8_field(&resp, 12), Some(0x2E));
        assert_eq!(read_u32_field(&resp, PACKET_LEN - 2), None);
        assert_eq!(read_u8_field(&resp, PACKET_LEN), None);
    }
}
