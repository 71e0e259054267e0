//! Asynchronous paced generator.
//!
//! Tokio counterpart of [`PacedGenerator`](crate::generator::PacedGenerator)
//! for embedding the probe in an async application. Same wire format, same
//! counter block, same cooperative shutdown; only the socket and the
//! pacing waits are async.

use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing::info;

use crate::analyzer::SHUTDOWN_GRACE;
use crate::counters::CountersHandle;
use crate::errors::ProbeError;
use crate::output::OutputHandle;
use crate::wire::{HEADER_SIZE, PacketHeader, now_nanos};

#[derive(Debug)]
pub struct AsyncPacedGenerator {
    pps: u64,
    payload_size: usize,
    byte_limit: Option<u64>,
    time_limit: Option<u64>,
    grace: Duration,
}

impl AsyncPacedGenerator {
    pub fn new(
        pps: u64,
        payload_size: usize,
        byte_limit: Option<u64>,
        time_limit: Option<u64>,
    ) -> Self {
        Self {
            pps,
            payload_size,
            byte_limit,
            time_limit,
            grace: SHUTDOWN_GRACE,
        }
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sends paced datagrams on a connected socket until a cap fires.
    pub async fn run(
        &mut self,
        sock: &UdpSocket,
        shared: &CountersHandle,
        output: &OutputHandle,
    ) -> Result<(), ProbeError> {
        if self.pps == 0 {
            return Err(ProbeError::InvalidConfig("packet rate must be at least 1"));
        }
        if self.payload_size < HEADER_SIZE {
            return Err(ProbeError::InvalidConfig(
                "datagram size must fit the 16 byte header",
            ));
        }

        shared.lock().running = true;
        let result = self.send_loop(sock, shared, output).await;
        shared.lock().shutdown = true;
        tokio::time::sleep(self.grace).await;
        result
    }

    async fn send_loop(
        &mut self,
        sock: &UdpSocket,
        shared: &CountersHandle,
        output: &OutputHandle,
    ) -> Result<(), ProbeError> {
        let interval = Duration::from_nanos(1_000_000_000 / self.pps);
        let mut buf = vec![0u8; self.payload_size];
        for (i, byte) in buf.iter_mut().enumerate().skip(HEADER_SIZE) {
            *byte = ((i - HEADER_SIZE) % 256) as u8;
        }

        info!(pps = self.pps, payload_size = self.payload_size, "async generator started");

        let mut seq: u64 = 1;
        let mut total_bytes: u64 = 0;
        let start = Instant::now();

        loop {
            PacketHeader::new(now_nanos(), seq).write_to(&mut buf)?;
            let sent = sock.send(&buf).await.map_err(ProbeError::SendFailed)?;

            let elapsed = {
                let mut c = shared.lock();
                c.bytes_interval += sent as u64;
                c.packets_sent = seq;
                c.elapsed_secs
            };

            total_bytes += sent as u64;
            if self.byte_limit.is_some_and(|nb| total_bytes > nb) {
                output.lock().status_line(&format!(
                    "\nSend byte limit ({}) reached, quitting, sent {} bytes\n",
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

            wait_for_slot(seq, interval, start).await;
            seq += 1;
        }
    }
}

/// Async version of the paced slot wait: coarse sleep while far out, then
/// yield until the slot arrives.
async fn wait_for_slot(seq: u64, interval: Duration, start: Instant) {
    let next_target = start + Duration::from_secs_f64(seq as f64 * interval.as_secs_f64());
    loop {
        let now = Instant::now();
        if now >= next_target {
            break;
        }

        let remaining = next_target - now;
        if remaining > Duration::from_micros(200) {
            tokio::time::sleep(remaining - Duration::from_micros(100)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::new_session;
    use crate::output::{CapturingOutput, output_handle};

    #[tokio::test]
    async fn sends_a_monotonic_sequence_until_the_byte_cap() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server.local_addr().unwrap()).await.unwrap();

        let shared = new_session();
        let output = output_handle(CapturingOutput::new());

        let mut generator = AsyncPacedGenerator::new(5_000, 64, Some(64 * 4), None)
            .shutdown_grace(Duration::from_millis(10));
        generator.run(&client, &shared, &output).await.unwrap();

        let mut buf = [0u8; 128];
        let mut expected_seq = 1u64;
        for _ in 0..5 {
            let len = server.recv(&mut buf).await.unwrap();
            assert_eq!(len, 64);
            let header = PacketHeader::read_from(&buf[..len]).unwrap();
            assert_eq!(header.seq, expected_seq);
            expected_seq += 1;
        }

        let c = shared.lock();
        assert_eq!(c.packets_sent, 5);
        assert!(c.shutdown);
    }
}
