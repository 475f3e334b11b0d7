//! ISP session: command execution and session state.
//!
//! One session owns one serial port for its whole lifetime. It is the only
//! place that mutates the package number and the connection flag; every
//! command goes through the same build → transmit → read → validate path
//! with the frame snapshot kept for checksum verification.

use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::port::{NativePort, Port, SerialConfig};
use crate::protocol::packet::{self, Command, PAYLOAD_OFFSET, Packet};
use crate::protocol::sequence::SequenceTracker;
use crate::transport::{
    BAUD_RATE, CONNECT_TIMEOUT, DEFAULT_TIMEOUT, ERASE_TIMEOUT, Transport,
};

/// How long the flash controller keeps erasing after acknowledging
/// erase-all. The wait is a fixed block, not a poll.
pub const ERASE_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// An ISP session over one serial port.
pub struct IspSession<P: Port> {
    pub(crate) transport: Transport<P>,
    pub(crate) sequence: SequenceTracker,
    pub(crate) connected: bool,
    device_id: Option<u32>,
    firmware_version: Option<u8>,
    config_words: Option<(u32, u32)>,
}

impl IspSession<NativePort> {
    /// Open a serial port at the boot ROM's fixed baud rate and wrap it in a
    /// session.
    pub fn open(port_name: &str) -> Result<Self> {
        let config = SerialConfig::new(port_name, BAUD_RATE).with_timeout(DEFAULT_TIMEOUT);
        Ok(Self::new(NativePort::open(&config)?))
    }
}

impl<P: Port> IspSession<P> {
    /// Create a session over an already-open port.
    pub fn new(port: P) -> Self {
        Self {
            transport: Transport::new(port),
            sequence: SequenceTracker::new(),
            connected: false,
            device_id: None,
            firmware_version: None,
            config_words: None,
        }
    }

    /// Whether the boot ROM has acknowledged a connect.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The current package number.
    pub fn sequence_number(&self) -> u32 {
        self.sequence.current()
    }

    /// Device id from the last successful `read_device_id`.
    pub fn device_id(&self) -> Option<u32> {
        self.device_id
    }

    /// Boot ROM firmware version from the last successful query.
    pub fn firmware_version(&self) -> Option<u8> {
        self.firmware_version
    }

    /// Config words from the last successful `read_config`.
    pub fn config_words(&self) -> Option<(u32, u32)> {
        self.config_words
    }

    /// Close the port and drop the connection state.
    pub fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.transport.close()
    }

    /// Try to establish an ISP connection.
    ///
    /// One attempt: transmit a connect frame with the package number reset
    /// to 1 and poll briefly for the acknowledgement. A silent or garbled
    /// reply yields `Ok(false)`; connecting is expected to fail until the
    /// device reboots into the boot ROM, and the caller drives the retry
    /// loop.
    pub fn connect(&mut self) -> Result<bool> {
        if self.connected {
            return Ok(true);
        }

        self.transport.set_timeout(CONNECT_TIMEOUT)?;
        self.sequence.reset();
        let frame = Packet::new(Command::Connect, self.sequence.current());
        self.transport.write_packet(frame.bytes())?;

        let response = self.transport.read_line()?;
        if response.is_empty() || frame.validate(&response).is_err() {
            trace!("no connect acknowledgement from boot ROM");
            self.connected = false;
            return Ok(false);
        }

        self.transport.set_timeout(DEFAULT_TIMEOUT)?;
        self.connected = true;
        debug!("boot ROM connected on {}", self.transport.name());
        Ok(true)
    }

    /// Resynchronize the package number to its baseline of 1.
    ///
    /// Required after connecting and again after any operation (like a mass
    /// erase) that invalidates the package-number contract.
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.sequence.reset();
        let mut frame = Packet::new(Command::SyncPackno, self.sequence.current());
        frame.write_u32(PAYLOAD_OFFSET, self.sequence.current());
        self.transact(&frame)?;
        debug!("package number resynchronized");
        Ok(())
    }

    /// Read the device id.
    pub fn read_device_id(&mut self) -> Result<u32> {
        let response = self.execute(Command::GetDeviceId)?;
        let id = packet::read_u32_field(&response, PAYLOAD_OFFSET)
            .ok_or_else(|| Error::InvalidResponse("device id field missing".into()))?;
        self.device_id = Some(id);
        Ok(id)
    }

    /// Read the boot ROM firmware version.
    pub fn read_firmware_version(&mut self) -> Result<u8> {
        let response = self.execute(Command::GetFwVersion)?;
        let version = packet::read_u8_field(&response, PAYLOAD_OFFSET)
            .ok_or_else(|| Error::InvalidResponse("firmware version field missing".into()))?;
        self.firmware_version = Some(version);
        Ok(version)
    }

    /// Read the two config words.
    pub fn read_config(&mut self) -> Result<(u32, u32)> {
        let response = self.execute(Command::ReadConfig)?;
        let config0 = packet::read_u32_field(&response, PAYLOAD_OFFSET);
        let config1 = packet::read_u32_field(&response, PAYLOAD_OFFSET + 4);
        let (Some(config0), Some(config1)) = (config0, config1) else {
            return Err(Error::InvalidResponse("config word fields missing".into()));
        };
        self.config_words = Some((config0, config1));
        Ok((config0, config1))
    }

    /// Erase all of APROM.
    ///
    /// The acknowledgement can take several seconds, and the flash
    /// controller keeps working after it; the call blocks for
    /// [`ERASE_SETTLE_DELAY`] on top before returning.
    pub fn erase_all(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.transport.set_timeout(ERASE_TIMEOUT)?;
        let frame = Packet::new(Command::EraseAll, self.sequence.next());
        let result = self.transact(&frame);
        self.transport.set_timeout(DEFAULT_TIMEOUT)?;
        result?;
        self.sequence.commit();
        debug!("erase acknowledged, waiting out the settle delay");
        thread::sleep(ERASE_SETTLE_DELAY);
        Ok(())
    }

    /// Reset the device, leaving ISP mode.
    pub fn reset(&mut self) -> Result<()> {
        self.leave(Command::Reset)
    }

    /// Leave ISP mode and run the application ROM.
    pub fn run_aprom(&mut self) -> Result<()> {
        self.leave(Command::RunAprom)
    }

    /// Leave ISP mode and run the loader ROM.
    pub fn run_ldrom(&mut self) -> Result<()> {
        self.leave(Command::RunLdrom)
    }

    /// Commands that make the boot ROM leave protocol mode: transmit, read
    /// whatever reply may come, and consider the session disconnected no
    /// matter what.
    fn leave(&mut self, command: Command) -> Result<()> {
        self.ensure_connected()?;
        let frame = Packet::new(command, self.sequence.next());
        self.transport.write_packet(frame.bytes())?;
        let _ = self.transport.read_line();
        self.connected = false;
        self.sequence.commit();
        debug!("sent {command:?}, session disconnected");
        Ok(())
    }

    /// Execute an ordinary query command and return its validated response.
    fn execute(&mut self, command: Command) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        let frame = Packet::new(command, self.sequence.next());
        let response = self.transact(&frame)?;
        self.sequence.commit();
        Ok(response)
    }

    /// Transmit a frame and validate its reply against the sent snapshot.
    fn transact(&mut self, frame: &Packet) -> Result<Vec<u8>> {
        self.transport.write_packet(frame.bytes())?;
        let response = self.transport.read_line()?;
        if response.is_empty() {
            return Err(Error::Timeout(format!(
                "no response to command {:#04x}",
                frame.command_code()
            )));
        }
        frame.validate(&response)?;
        Ok(response)
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

impl<P: Port> Drop for IspSession<P> {
    fn drop(&mut self) {
        let _ = self.transport.close();
    }
}
