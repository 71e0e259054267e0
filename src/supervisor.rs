//! Once-per-second statistics supervision.
//!
//! The supervisor runs on its own thread beside the producer. Every tick
//! it snapshots and resets the shared counter block, feeds the rate and
//! jitter sliding windows, builds a [`Report`], and hands it to the output
//! sink. When the producer flags shutdown it emits a final report and
//! terminates; the pairing is single-use.

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::counters::{CountersHandle, SharedCounters};
use crate::history::SlidingWindow;
use crate::output::{OutputHandle, Report};

const NANOS_PER_MS: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Producer has not started yet; ticks are no-ops.
    Idle,
    /// Emitting one data line per tick.
    Reporting,
    /// Final report emitted; the tick loop has exited.
    Terminated,
}

/// Per-session statistics supervisor.
pub struct Supervisor {
    tick: Duration,
    rate: SlidingWindow,
    jitter: SlidingWindow,
    secs: u64,
    need_header: bool,
    state: State,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_tick(Duration::from_secs(1))
    }

    /// A supervisor with a non-standard tick. Reports are still labelled
    /// in ticks ("seconds"); only tests have a reason to shorten this.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick,
            rate: SlidingWindow::new(),
            jitter: SlidingWindow::new(),
            secs: 0,
            need_header: true,
            state: State::Idle,
        }
    }

    /// Runs the tick loop on a dedicated thread.
    pub fn spawn(self, shared: CountersHandle, output: OutputHandle) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run(&shared, &output))
    }

    /// Runs the tick loop until the producer requests shutdown.
    ///
    /// The supervisor never fails: Idle ticks are silent no-ops, and it is
    /// the sole writer of `elapsed_secs`.
    pub fn run(mut self, shared: &CountersHandle, output: &OutputHandle) {
        let mut next = Instant::now() + self.tick;

        while self.state != State::Terminated {
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            }
            next += self.tick;

            let snapshot = {
                let mut c = shared.lock();
                if !c.running {
                    // Producer that never started but already asked to shut
                    // down: nothing to report, just stop.
                    if c.shutdown {
                        c.shutdown = false;
                        self.state = State::Terminated;
                    }
                    continue;
                }
                let snapshot = *c;
                c.bytes_interval = 0;
                c.jitter_sum_nanos = 0;
                c.jitter_samples = 0;
                c.elapsed_secs = self.secs + 1;
                snapshot
            };
            self.secs += 1;

            let report = self.observe(&snapshot);

            let mut out = output.lock();
            if snapshot.shutdown {
                out.status_line("Final statistics:");
                out.header();
                out.data_line(&report);

                let mut c = shared.lock();
                c.elapsed_secs = 0;
                c.shutdown = false;
                self.state = State::Terminated;
                debug!(secs = self.secs, "supervisor terminated");
            } else {
                if self.need_header {
                    out.header();
                    self.need_header = false;
                }
                out.data_line(&report);
                self.state = State::Reporting;
            }
        }
    }

    /// Folds one interval snapshot into the sliding windows and derives
    /// the report for it. Pure bookkeeping; no locks, no I/O.
    fn observe(&mut self, snapshot: &SharedCounters) -> Report {
        self.rate.push(snapshot.bytes_interval * 8);

        let jitter_sample = if snapshot.jitter_samples == 0 {
            0
        } else {
            snapshot.jitter_sum_nanos / snapshot.jitter_samples
        };
        self.jitter.push(jitter_sample);

        Report {
            timestamp: Utc::now().format("[%m-%d-%Y][%H:%M:%S%.6f]").to_string(),
            secs: self.secs,

            rate_last: self.rate.last(),
            rate_10s: self.rate.windowed_avg(),
            rate_avg: self.rate.lifetime_total() / self.secs,
            rate_min: self.rate.min(),
            rate_max: self.rate.max(),

            jitter_last_ms: self.jitter.last() as f64 / NANOS_PER_MS,
            jitter_10s_ms: self.jitter.windowed_avg() as f64 / NANOS_PER_MS,
            jitter_avg_ms: (self.jitter.lifetime_total() / self.secs) as f64 / NANOS_PER_MS,
            jitter_min_ms: self.jitter.min() as f64 / NANOS_PER_MS,
            jitter_max_ms: self.jitter.max() as f64 / NANOS_PER_MS,

            packets_sent: snapshot.packets_sent,
            packets_received: snapshot.packets_received,
            packets_dropped: snapshot.packets_dropped,
            packets_out_of_order: snapshot.packets_out_of_order,
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
