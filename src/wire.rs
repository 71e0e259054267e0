//! Datagram wire format shared by the generator and the analyzer.
//!
//! Every probe datagram starts with a 16-byte big-endian header: the send
//! timestamp in nanoseconds, then the sequence number. The rest of the
//! datagram is filler up to the configured size.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::ProbeError;

/// Size of the packet header in bytes (8-byte timestamp + 8-byte sequence).
pub const HEADER_SIZE: usize = 16;

/// Header embedded at the front of every probe datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Send timestamp, nanoseconds since the unix epoch.
    pub send_nanos: u64,
    /// Sequence number, assigned by the generator starting at 1.
    pub seq: u64,
}

impl PacketHeader {
    pub fn new(send_nanos: u64, seq: u64) -> Self {
        Self { send_nanos, seq }
    }

    /// Writes the header into the first [`HEADER_SIZE`] bytes of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ShortDatagram`] if the buffer cannot hold a
    /// full header.
    pub fn write_to(&self, buffer: &mut [u8]) -> Result<(), ProbeError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ProbeError::ShortDatagram { len: buffer.len() });
        }
        buffer[0..8].copy_from_slice(&self.send_nanos.to_be_bytes());
        buffer[8..16].copy_from_slice(&self.seq.to_be_bytes());
        Ok(())
    }

    /// Decodes a header from the first [`HEADER_SIZE`] bytes of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ShortDatagram`] for truncated datagrams rather
    /// than reading out of bounds.
    pub fn read_from(buffer: &[u8]) -> Result<Self, ProbeError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ProbeError::ShortDatagram { len: buffer.len() });
        }
        let send_nanos = u64::from_be_bytes(buffer[0..8].try_into().unwrap());
        let seq = u64::from_be_bytes(buffer[8..16].try_into().unwrap());
        Ok(Self { send_nanos, seq })
    }
}

/// Current wall-clock time in nanoseconds since the unix epoch.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut buf = [0u8; 32];
        let header = PacketHeader::new(1_234_567_890, 42);
        header.write_to(&mut buf).unwrap();

        let decoded = PacketHeader::read_from(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_is_big_endian() {
        let mut buf = [0u8; HEADER_SIZE];
        PacketHeader::new(1, 2).write_to(&mut buf).unwrap();

        assert_eq!(buf[7], 1);
        assert_eq!(buf[15], 2);
        assert!(buf[0..7].iter().all(|&b| b == 0));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let buf = [0u8; HEADER_SIZE - 1];
        let err = PacketHeader::read_from(&buf).unwrap_err();
        assert!(matches!(err, ProbeError::ShortDatagram { len: 15 }));

        let mut buf = [0u8; 8];
        let err = PacketHeader::new(0, 1).write_to(&mut buf).unwrap_err();
        assert!(matches!(err, ProbeError::ShortDatagram { len: 8 }));
    }

    #[test]
    fn now_nanos_is_monotonic_enough() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(b >= a);
        assert!(a > 0);
    }
}
