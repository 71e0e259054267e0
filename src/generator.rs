//! Send-side paced traffic generation.
//!
//! [`PacedGenerator`] emits fixed-size, sequenced, timestamped datagrams at
//! a configured packet rate into a [`PacketSink`] until a byte or time cap
//! fires. There is deliberately no backpressure: measuring loss under load
//! is the point.

use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::analyzer::SHUTDOWN_GRACE;
use crate::counters::CountersHandle;
use crate::errors::ProbeError;
use crate::output::OutputHandle;
use crate::transport::PacketSink;
use crate::wire::{HEADER_SIZE, PacketHeader, now_nanos};

/// Paced datagram emitter for one session.
#[derive(Debug)]
pub struct PacedGenerator {
    pps: u64,
    payload_size: usize,
    byte_limit: Option<u64>,
    time_limit: Option<u64>,
    grace: Duration,
}

impl PacedGenerator {
    /// `pps` is the target packet rate, `payload_size` the full datagram
    /// size including the 16-byte header. A `None` cap means unlimited.
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

    /// Overrides the post-shutdown grace period (see the analyzer).
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs the paced send loop to completion.
    ///
    /// The achieved rate is bounded by timer and scheduler resolution at
    /// high configured rates; the pacer never tries to catch up by
    /// bursting past its slot schedule.
    pub fn run<K: PacketSink>(
        &mut self,
        sink: &mut K,
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
        let result = self.send_loop(sink, shared, output);
        shared.lock().shutdown = true;
        thread::sleep(self.grace);
        result
    }

    fn send_loop<K: PacketSink>(
        &mut self,
        sink: &mut K,
        shared: &CountersHandle,
        output: &OutputHandle,
    ) -> Result<(), ProbeError> {
        let interval = Duration::from_nanos(1_000_000_000 / self.pps);
        let mut buf = vec![0u8; self.payload_size];
        for (i, byte) in buf.iter_mut().enumerate().skip(HEADER_SIZE) {
            *byte = ((i - HEADER_SIZE) % 256) as u8;
        }

        info!(
            pps = self.pps,
            payload_size = self.payload_size,
            byte_limit = ?self.byte_limit,
            time_limit = ?self.time_limit,
            "generator started"
        );

        let mut seq: u64 = 1;
        let mut total_bytes: u64 = 0;
        let start = Instant::now();

        loop {
            PacketHeader::new(now_nanos(), seq).write_to(&mut buf)?;
            let sent = sink.send_packet(&buf)?;

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

            wait_for_slot(seq, interval, start);
            seq += 1;
        }
    }
}

/// Blocks until the send slot for `seq` (at `start + seq * interval`).
///
/// Coarse sleep while far out, then yield-spin for the last stretch to
/// avoid oversleeping past the slot.
#[inline]
fn wait_for_slot(seq: u64, interval: Duration, start: Instant) {
    let next_target = start + Duration::from_secs_f64(seq as f64 * interval.as_secs_f64());
    loop {
        let now = Instant::now();
        if now >= next_target {
            break;
        }

        let remaining = next_target - now;
        if remaining > Duration::from_micros(200) {
            thread::sleep(remaining - Duration::from_micros(100));
        } else {
            thread::yield_now();
        }
    }
}
