//! Receive-side stream analysis.
//!
//! [`StreamAnalyzer`] classifies every arrival as in-order, lost, or
//! out-of-order from the sequence stream alone and estimates jitter over
//! runs of three consecutive packets. [`UdpAnalyzer`] drives it from a
//! blocking [`PacketSource`] and folds the results into the shared
//! counter block.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::counters::CountersHandle;
use crate::errors::ProbeError;
use crate::output::OutputHandle;
use crate::transport::PacketSource;
use crate::wire::{PacketHeader, now_nanos};

/// How long a producer waits after flagging shutdown so the supervisor is
/// guaranteed a tick to emit the final report.
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Per-session sequence and jitter tracking state.
///
/// Owned by one analyzer instance so several sessions can run in the same
/// process. Receive timestamps use 0 as the unset sentinel; wall-clock
/// nanos are never 0 in practice.
#[derive(Debug, Default)]
pub struct StreamAnalyzer {
    highest_seq: u64,
    prev_seq: u64,
    two_back_seq: u64,
    prev_recv_nanos: u64,
    two_back_recv_nanos: u64,

    received: u64,
    dropped: u64,
    out_of_order: u64,
}

impl StreamAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for one arrival and returns its jitter sample, if any.
    ///
    /// A sample exists only when this packet and the previous two are
    /// sequence-consecutive and were the last three received; it is the
    /// discrete second difference `|2*t2 - (t1 + t3)|` of their arrival
    /// times, which is ~0 for evenly spaced arrivals. Any other arrival is
    /// accounted as a forward gap (loss) or an out-of-order packet and
    /// contributes no sample.
    pub fn record(&mut self, seq: u64, recv_nanos: u64) -> Option<u64> {
        let jitter = if self.two_back_recv_nanos != 0
            && seq == self.highest_seq + 1
            && seq == self.prev_seq + 1
            && self.prev_seq == self.two_back_seq + 1
        {
            Some((2 * self.prev_recv_nanos).abs_diff(self.two_back_recv_nanos + recv_nanos))
        } else {
            if seq > self.highest_seq {
                // Forward gap: everything between the old highest and this
                // packet is presumed lost (zero if consecutive).
                self.dropped += seq - self.highest_seq - 1;
            } else {
                // A packet at or below the highest sequence arrived late;
                // it was already counted as lost when the gap was seen.
                // Saturate so a duplicate cannot wrap the counter.
                self.dropped = self.dropped.saturating_sub(1);
                self.out_of_order += 1;
            }
            None
        };

        self.two_back_seq = self.prev_seq;
        self.prev_seq = seq;
        self.two_back_recv_nanos = self.prev_recv_nanos;
        self.prev_recv_nanos = recv_nanos;

        if seq > self.highest_seq {
            self.highest_seq = seq;
        }
        self.received += 1;

        jitter
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }
}

/// Receive loop: consumes datagrams from a [`PacketSource`] until end of
/// stream or a configured cap, updating the shared counter block.
#[derive(Debug)]
pub struct UdpAnalyzer {
    byte_limit: Option<u64>,
    time_limit: Option<u64>,
    grace: Duration,
}

impl UdpAnalyzer {
    /// A `None` cap means unlimited.
    pub fn new(byte_limit: Option<u64>, time_limit: Option<u64>) -> Self {
        Self {
            byte_limit,
            time_limit,
            grace: SHUTDOWN_GRACE,
        }
    }

    /// Overrides the post-shutdown grace period. Tests shorten it; the
    /// default leaves the supervisor at least one full tick.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs the receive loop to completion.
    ///
    /// A clean end of stream and either cap firing are normal termination;
    /// transport errors propagate. On every exit path the shutdown flag is
    /// raised and the grace period observed so the supervisor can emit its
    /// final report before the caller closes the transport.
    pub fn run<S>(
        &mut self,
        source: &mut S,
        shared: &CountersHandle,
        output: &OutputHandle,
    ) -> Result<(), ProbeError>
    where
        S: PacketSource,
    {
        let result = self.recv_loop(source, shared, output);
        shared.lock().shutdown = true;
        thread::sleep(self.grace);
        result
    }

    fn recv_loop<S>(
        &mut self,
        source: &mut S,
        shared: &CountersHandle,
        output: &OutputHandle,
    ) -> Result<(), ProbeError>
    where
        S: PacketSource,
    {
        let mut tracker = StreamAnalyzer::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut total_bytes: u64 = 0;

        info!(
            byte_limit = ?self.byte_limit,
            time_limit = ?self.time_limit,
            "analyzer started"
        );

        loop {
            let len = match source.recv_packet(&mut buf)? {
                Some(len) => len,
                None => {
                    info!(total_bytes, "end of stream");
                    return Ok(());
                }
            };
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

            // Pure arithmetic under the lock; the supervisor reads the same
            // block once per second.
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::counters::new_session;
    use crate::output::{CapturingOutput, output_handle};
    use crate::transport::{PacketSink, channel_transport};
    use crate::wire::HEADER_SIZE;

    fn feed(tracker: &mut StreamAnalyzer, seqs: &[u64]) {
        // One millisecond apart, perfectly even.
        for (i, &seq) in seqs.iter().enumerate() {
            tracker.record(seq, 1_000_000_000 + i as u64 * 1_000_000);
        }
    }

    #[test]
    fn in_order_stream_has_no_loss_or_reordering() {
        let mut tracker = StreamAnalyzer::new();
        feed(&mut tracker, &(1..=100).collect::<Vec<_>>());

        assert_eq!(tracker.received(), 100);
        assert_eq!(tracker.dropped(), 0);
        assert_eq!(tracker.out_of_order(), 0);
    }

    #[test]
    fn forward_gap_counts_as_loss_when_seen() {
        let mut tracker = StreamAnalyzer::new();
        tracker.record(1, 10);
        tracker.record(2, 20);
        assert_eq!(tracker.dropped(), 0);

        // Seq 3 missing: the drop is charged the moment 4 arrives.
        tracker.record(4, 30);
        assert_eq!(tracker.dropped(), 1);

        tracker.record(5, 40);
        assert_eq!(tracker.dropped(), 1);
        assert_eq!(tracker.out_of_order(), 0);
        assert_eq!(tracker.received(), 4);
    }

    #[test]
    fn late_arrival_reverses_the_loss_attribution() {
        let mut tracker = StreamAnalyzer::new();
        tracker.record(1, 10);
        tracker.record(3, 20);
        assert_eq!(tracker.dropped(), 1);

        // 2 shows up late: no longer lost, now out-of-order, no jitter.
        let jitter = tracker.record(2, 30);
        assert_eq!(jitter, None);
        assert_eq!(tracker.dropped(), 0);
        assert_eq!(tracker.out_of_order(), 1);
    }

    #[test]
    fn duplicate_cannot_drive_dropped_negative() {
        let mut tracker = StreamAnalyzer::new();
        tracker.record(1, 10);
        tracker.record(1, 20);

        assert_eq!(tracker.dropped(), 0);
        assert_eq!(tracker.out_of_order(), 1);
        assert_eq!(tracker.received(), 2);
    }

    #[test]
    fn jitter_needs_three_consecutive_arrivals() {
        let mut tracker = StreamAnalyzer::new();
        assert_eq!(tracker.record(1, 1_000), None);
        assert_eq!(tracker.record(2, 2_000), None);
        // Third consecutive arrival produces the first sample.
        assert!(tracker.record(3, 3_000).is_some());
    }

    #[test]
    fn evenly_spaced_arrivals_have_zero_jitter() {
        let mut tracker = StreamAnalyzer::new();
        tracker.record(1, 1_000_000);
        tracker.record(2, 2_000_000);
        let jitter = tracker.record(3, 3_000_000);
        assert_eq!(jitter, Some(0));
    }

    #[test]
    fn uneven_spacing_is_the_second_difference() {
        let mut tracker = StreamAnalyzer::new();
        tracker.record(1, 1_000);
        tracker.record(2, 2_000);
        // Gap grew from 1000ns to 3000ns: |2*2000 - (1000 + 5000)| = 2000.
        assert_eq!(tracker.record(3, 5_000), Some(2_000));
    }

    #[test]
    fn jitter_resumes_after_a_gap_once_three_in_a_row_land() {
        let mut tracker = StreamAnalyzer::new();
        tracker.record(1, 1_000);
        tracker.record(2, 2_000);
        tracker.record(4, 3_000);
        assert_eq!(tracker.dropped(), 1);

        // 4 broke the run; 5 continues from it but the run restarts.
        assert_eq!(tracker.record(5, 4_000), None);
        assert!(tracker.record(6, 5_000).is_some());
    }

    #[test]
    fn run_consumes_stream_until_eof_and_flags_shutdown() {
        let shared = new_session();
        let output = output_handle(CapturingOutput::new());
        let (mut sink, mut source) = channel_transport();

        let mut buf = vec![0u8; 100];
        for seq in 1..=5u64 {
            PacketHeader::new(now_nanos(), seq).write_to(&mut buf).unwrap();
            sink.send_packet(&buf).unwrap();
        }
        drop(sink);

        let mut analyzer =
            UdpAnalyzer::new(None, None).shutdown_grace(Duration::from_millis(10));
        analyzer.run(&mut source, &shared, &output).unwrap();

        let c = shared.lock();
        assert_eq!(c.packets_received, 5);
        assert_eq!(c.packets_dropped, 0);
        assert_eq!(c.packets_out_of_order, 0);
        assert_eq!(c.bytes_interval, 500);
        // Three jitter samples: one per arrival from seq 3 on.
        assert_eq!(c.jitter_samples, 3);
        assert!(c.running);
        assert!(c.shutdown);
    }

    #[test]
    fn run_stops_at_the_byte_limit_with_a_status_line() {
        let shared = new_session();
        let cap = Arc::new(Mutex::new(CapturingOutput::new()));
        let output: OutputHandle = cap.clone();
        let (mut sink, mut source) = channel_transport();

        let mut buf = vec![0u8; 100];
        for seq in 1..=10u64 {
            PacketHeader::new(now_nanos(), seq).write_to(&mut buf).unwrap();
            sink.send_packet(&buf).unwrap();
        }

        let mut analyzer =
            UdpAnalyzer::new(Some(300), None).shutdown_grace(Duration::from_millis(10));
        analyzer.run(&mut source, &shared, &output).unwrap();

        assert_eq!(shared.lock().packets_received, 3);
        assert!(shared.lock().shutdown);

        let out = cap.lock();
        assert_eq!(out.status_lines.len(), 1);
        assert!(out.status_lines[0].contains("Byte limit (300)"));
    }

    #[test]
    fn truncated_datagrams_are_skipped_not_decoded() {
        let shared = new_session();
        let output = output_handle(CapturingOutput::new());
        let (mut sink, mut source) = channel_transport();

        sink.send_packet(&[0u8; HEADER_SIZE - 1]).unwrap();
        let mut buf = vec![0u8; 64];
        PacketHeader::new(now_nanos(), 1).write_to(&mut buf).unwrap();
        sink.send_packet(&buf).unwrap();
        drop(sink);

        let mut analyzer =
            UdpAnalyzer::new(None, None).shutdown_grace(Duration::from_millis(10));
        analyzer.run(&mut source, &shared, &output).unwrap();

        assert_eq!(shared.lock().packets_received, 1);
        assert_eq!(shared.lock().bytes_interval, 64);
    }
}
