//! The shared counter block exchanged between a producer and the supervisor.
//!
//! One instance exists per measurement session. The producer (generator or
//! analyzer) folds per-datagram byte/packet/jitter updates in; the
//! supervisor snapshots the whole block once per second, zeroes the
//! interval accumulators, and advances `elapsed_secs`. Both sides serialize
//! through the same mutex and never do I/O while holding it.

use std::sync::Arc;

use parking_lot::Mutex;

/// Aggregate state shared between one producer and one supervisor.
///
/// Interval accumulators (`bytes_interval`, `jitter_sum_nanos`,
/// `jitter_samples`) are reset by the supervisor every tick; everything else
/// is a lifetime counter or a lifecycle flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedCounters {
    /// Bytes moved since the last supervisor tick.
    pub bytes_interval: u64,
    /// Sum of jitter samples (nanoseconds) since the last tick.
    pub jitter_sum_nanos: u64,
    /// Number of jitter samples since the last tick.
    pub jitter_samples: u64,

    /// Packets sent over the whole session (generator side).
    pub packets_sent: u64,
    /// Packets received over the whole session (analyzer side).
    pub packets_received: u64,
    /// Packets inferred lost from sequence gaps.
    pub packets_dropped: u64,
    /// Packets that arrived after a higher sequence number.
    pub packets_out_of_order: u64,

    /// Whole seconds elapsed, advanced only by the supervisor.
    pub elapsed_secs: u64,

    /// Set by the producer once traffic is flowing; the supervisor skips
    /// ticks until then.
    pub running: bool,
    /// Cooperative shutdown flag. The producer sets it on exit and the
    /// supervisor clears it after emitting the final report.
    pub shutdown: bool,
}

/// Handle to the per-session counter block.
pub type CountersHandle = Arc<Mutex<SharedCounters>>;

/// Creates a fresh counter block for a new session.
pub fn new_session() -> CountersHandle {
    Arc::new(Mutex::new(SharedCounters::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_zeroed_and_idle() {
        let shared = new_session();
        let c = shared.lock();
        assert_eq!(c.bytes_interval, 0);
        assert_eq!(c.elapsed_secs, 0);
        assert!(!c.running);
        assert!(!c.shutdown);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let shared = new_session();
        let snap = {
            let mut c = shared.lock();
            c.bytes_interval = 100;
            c.running = true;
            *c
        };
        shared.lock().bytes_interval = 0;
        assert_eq!(snap.bytes_interval, 100);
        assert!(snap.running);
    }
}
