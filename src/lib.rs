//! A synthetic UDP traffic probe for measuring throughput, loss,
//! reordering and jitter between two nodes.
//!
//! One side runs a [`PacedGenerator`] that emits sequenced, timestamped
//! datagrams at a fixed packet rate; the other runs a [`UdpAnalyzer`] that
//! classifies every arrival as in-order, lost, or out-of-order from the
//! sequence stream alone and estimates jitter over runs of three
//! consecutive packets. Next to either one, a [`Supervisor`] thread ticks
//! once per second, drains the shared counter block, and reports
//! last-second / last-10-second / lifetime statistics through a pluggable
//! [`Output`] sink. The protocol is one-way and unacknowledged on purpose:
//! loss is something to measure, not prevent.
//!
//! # Details
//!
//! - Sending side, paced at 1000 packets/sec of 1000-byte datagrams for
//!   10 seconds:
//!
//! ```no_run
//! use std::net::UdpSocket;
//! use std::thread;
//!
//! use udprobe::{ConsoleOutput, PacedGenerator, Supervisor, counters, output_handle};
//!
//! fn main() -> Result<(), udprobe::ProbeError> {
//!     let mut sock = UdpSocket::bind("0.0.0.0:0").map_err(udprobe::ProbeError::BindFailed)?;
//!     sock.connect("192.0.2.1:5021").map_err(udprobe::ProbeError::ConnectFailed)?;
//!
//!     let shared = counters::new_session();
//!     let output = output_handle(ConsoleOutput::new(std::io::stdout(), false, false));
//!
//!     let supervisor = Supervisor::new().spawn(shared.clone(), output.clone());
//!
//!     let mut generator = PacedGenerator::new(1000, 1000, None, Some(10));
//!     generator.run(&mut sock, &shared, &output)?;
//!
//!     supervisor.join().expect("supervisor thread panicked");
//!     Ok(())
//! }
//! ```
//!
//! - Receiving side, reporting with jitter and timestamp columns until the
//!   sender goes quiet for good (here: a 60 second time cap):
//!
//! ```no_run
//! use std::net::UdpSocket;
//!
//! use udprobe::{ConsoleOutput, Supervisor, UdpAnalyzer, counters, output_handle};
//!
//! fn main() -> Result<(), udprobe::ProbeError> {
//!     let mut sock = UdpSocket::bind("0.0.0.0:5021").map_err(udprobe::ProbeError::BindFailed)?;
//!
//!     let shared = counters::new_session();
//!     let output = output_handle(ConsoleOutput::new(std::io::stdout(), true, true));
//!
//!     let supervisor = Supervisor::new().spawn(shared.clone(), output.clone());
//!
//!     let mut analyzer = UdpAnalyzer::new(None, Some(60));
//!     analyzer.run(&mut sock, &shared, &output)?;
//!
//!     supervisor.join().expect("supervisor thread panicked");
//!     println!("last record: {:?}", output.lock().last_record());
//!     Ok(())
//! }
//! ```
//!
//! Any framed-datagram transport works in place of the socket — the
//! measurement engine only sees the [`PacketSource`] and [`PacketSink`]
//! traits, and [`transport::channel_transport`] provides an in-process
//! loopback pair. Async applications can use [`AsyncPacedGenerator`] and
//! [`AsyncUdpAnalyzer`] instead of spawning a sender/receiver thread.

pub mod analyzer;
pub mod counters;
pub mod errors;
pub mod generator;
pub mod history;
pub mod output;
pub mod supervisor;
pub mod transport;
pub mod wire;

pub use analyzer::{StreamAnalyzer, UdpAnalyzer};
pub use counters::{CountersHandle, SharedCounters};
pub use errors::ProbeError;
pub use generator::PacedGenerator;
pub use history::SlidingWindow;
pub use output::{
    CapturingOutput, ConsoleOutput, NullOutput, Output, OutputHandle, Report, output_handle,
};
pub use supervisor::Supervisor;
pub use transport::{PacketSink, PacketSource};
pub use wire::{HEADER_SIZE, PacketHeader};

// async part
pub mod async_analyzer;
pub mod async_generator;
pub use async_analyzer::AsyncUdpAnalyzer;
pub use async_generator::AsyncPacedGenerator;

#[cfg(test)]
mod end_to_end {
    use std::thread;
    use std::time::Duration;

    use crate::counters::new_session;
    use crate::output::{CapturingOutput, output_handle};
    use crate::transport::channel_transport;
    use crate::{PacedGenerator, UdpAnalyzer};

    #[test]
    fn lossless_loopback_run_reports_everything_received_in_order() {
        let (mut sink, mut source) = channel_transport();

        // 200 packets of 100 bytes at 2000 pps is about 100ms of traffic.
        let gen_shared = new_session();
        let gen_output = output_handle(CapturingOutput::new());
        let sender = thread::spawn({
            let gen_shared = gen_shared.clone();
            let gen_output = gen_output.clone();
            move || {
                PacedGenerator::new(2000, 100, Some(200 * 100 - 1), None)
                    .shutdown_grace(Duration::from_millis(10))
                    .run(&mut sink, &gen_shared, &gen_output)
            }
        });

        let recv_shared = new_session();
        let recv_output = output_handle(CapturingOutput::new());
        let mut analyzer =
            UdpAnalyzer::new(None, None).shutdown_grace(Duration::from_millis(10));
        analyzer
            .run(&mut source, &recv_shared, &recv_output)
            .unwrap();
        sender.join().unwrap().unwrap();

        let sent = gen_shared.lock().packets_sent;
        let c = recv_shared.lock();
        assert_eq!(c.packets_received, sent);
        assert_eq!(c.packets_dropped, 0);
        assert_eq!(c.packets_out_of_order, 0);
        // Every arrival past the second extends a consecutive run.
        assert_eq!(c.jitter_samples, sent - 2);
    }
}
