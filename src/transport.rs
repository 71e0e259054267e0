//! Framed-datagram transport seams.
//!
//! The measurement engine never manages socket lifecycle; it reads and
//! writes whole datagrams through these two traits. Any reliable framed
//! transport satisfies them — a UDP socket in production, an in-process
//! channel in tests.

use std::net::UdpSocket;
use std::sync::mpsc::{Receiver, RecvError, Sender};

use crate::errors::ProbeError;

/// Reads one datagram at a time.
pub trait PacketSource {
    /// Blocks for the next datagram, copying it into `buf`.
    ///
    /// Returns `Ok(Some(len))` for a datagram, `Ok(None)` on a clean end of
    /// stream (normal termination, not an error).
    fn recv_packet(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ProbeError>;
}

/// Writes one datagram at a time.
pub trait PacketSink {
    /// Sends a whole datagram, returning the number of bytes written.
    fn send_packet(&mut self, buf: &[u8]) -> Result<usize, ProbeError>;
}

impl PacketSource for UdpSocket {
    fn recv_packet(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ProbeError> {
        // recv_from so an unconnected server socket works too.
        let (len, _addr) = self.recv_from(buf).map_err(ProbeError::RecvFailed)?;
        Ok(Some(len))
    }
}

impl PacketSink for UdpSocket {
    fn send_packet(&mut self, buf: &[u8]) -> Result<usize, ProbeError> {
        self.send(buf).map_err(ProbeError::SendFailed)
    }
}

/// Sending half of an in-process loopback transport.
pub struct ChannelSink {
    tx: Sender<Vec<u8>>,
}

/// Receiving half of an in-process loopback transport. Yields end of
/// stream once every [`ChannelSink`] clone has been dropped.
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
}

/// A connected loopback pair carrying whole datagrams over an mpsc channel.
pub fn channel_transport() -> (ChannelSink, ChannelSource) {
    let (tx, rx) = std::sync::mpsc::channel();
    (ChannelSink { tx }, ChannelSource { rx })
}

impl PacketSink for ChannelSink {
    fn send_packet(&mut self, buf: &[u8]) -> Result<usize, ProbeError> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| ProbeError::SendFailed(std::io::ErrorKind::BrokenPipe.into()))?;
        Ok(buf.len())
    }
}

impl PacketSource for ChannelSource {
    fn recv_packet(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ProbeError> {
        match self.rx.recv() {
            Ok(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(Some(len))
            }
            // All senders gone: clean end of stream.
            Err(RecvError) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_pair_moves_datagrams() {
        let (mut sink, mut source) = channel_transport();
        sink.send_packet(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 16];
        let len = source.recv_packet(&mut buf).unwrap();
        assert_eq!(len, Some(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn dropped_sink_is_end_of_stream() {
        let (sink, mut source) = channel_transport();
        drop(sink);

        let mut buf = [0u8; 16];
        assert!(source.recv_packet(&mut buf).unwrap().is_none());
    }

    #[test]
    fn socket_pair_round_trip() {
        let mut server = UdpSocket::bind("127.0.0.1:0").expect("bind server");
        let mut client = UdpSocket::bind("127.0.0.1:0").expect("bind client");
        client.connect(server.local_addr().unwrap()).unwrap();

        client.send_packet(&[9; 32]).unwrap();

        let mut buf = [0u8; 64];
        let len = server.recv_packet(&mut buf).unwrap();
        assert_eq!(len, Some(32));
        assert_eq!(buf[31], 9);
    }
}
