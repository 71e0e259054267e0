//! Asynchronous receive-side analysis.
//!
//! Tokio counterpart of [`UdpAnalyzer`](crate::analyzer::UdpAnalyzer). It
//! reuses the same [`StreamAnalyzer`] state machine and counter block;
//! only the socket read and the grace sleep are async. UDP has no end of
//! stream, so this loop ends on the byte or time cap alone.

use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::analyzer::{SHUTDOWN_GRACE, StreamAnalyzer};
use crate::counters::CountersHandle;
use crate::errors::ProbeError;
use crate::output::OutputHandle;
use crate::wire::{PacketHeader, now_nanos};

#[derive(Debug)]
pub struct AsyncUdpAnalyzer {
    byte_limit: Option<u64>,
    time_limit: Option<u64>,
    grace: Duration,
}

impl AsyncUdpAnalyzer {
    pub fn new(byte_limit: Option<u64>, time_limit: Option<u64>) -> Self {
        Self {
            byte_limit,
            time_limit,
            grace: SHUTDOWN_GRACE,
        }
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Consumes datagrams from a bound socket until a cap fires.
    pub async fn run(
        &mut self,
        sock: &UdpSocket,
        shared: &CountersHandle,
        output: &OutputHandle,
    ) -> Result<(), ProbeError> {
        let result = self.recv_loop(sock, shared, output).await;
        shared.lock().shutdown = true;
        tokio::time::sleep(self.grace).await;
        result
    }

    async fn recv_loop(
        &mut self,
        sock: &UdpSocket,
        shared: &CountersHandle,
        output: &OutputHandle,
    ) -> Result<(), ProbeError> {
        let mut tracker = StreamAnalyzer::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut total_bytes: u64 = 0;

        info!(
            byte_limit = ?self.byte_limit,
            time_limit = ?self.time_limit,
            "async analyzer started"
        );

        loop {
            let (len, _addr) = sock
                .recv_from(&mut buf)
                .await
                .map_err(ProbeError::RecvFailed)?;
            let recv_nanos = now_nanos();

            let header = match PacketHeader::read_from(&buf[..len]) {
                Ok(header) => header,
                Err(ProbeError::ShortDatagram { len }) => {
                    warn!(len, "discarding truncated datagram");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let jitter = tracker.record(header.seq, recv_nanos);

            let elapsed = {
                let mut c = shared.lock();
                c.bytes_interval += len as u64;
                if let Some(sample) = jitter {
                    c.jitter_sum_nanos += sample;
                    c.jitter_samples += 1;
                }
                c.packets_received = tracker.received();
                c.packets_dropped = tracker.dropped();
                c.packets_out_of_order = tracker.out_of_order();
                c.running = true;
                c.elapsed_secs
            };

            total_bytes += len as u64;
            if self.byte_limit.is_some_and(|nb| total_bytes >= nb) {
                output.lock().status_line(&format!(
                    "\nByte limit ({}) reached, quitting, {} total bytes received\n",
                    self.byte_limit.unwrap_or(0),
                    total_bytes
                ));
                return Ok(());
            }
            if self.time_limit.is_some_and(|ns| elapsed >= ns) {
                output.lock().status_line(&format!(
                    "\nTime limit ({}) seconds reached, quitting\n",
                    self.time_limit.unwrap_or(0)
                ));
                return Ok(());
            }
        }
    }
}
