//! Protocol implementations.

pub mod packet;
pub mod sequence;

// Re-export common types
pub use packet::{Command, PACKET_LEN, Packet, PAYLOAD_OFFSET};
pub use sequence::SequenceTracker;
