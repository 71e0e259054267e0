//! Report records and the pluggable output sink.
//!
//! The supervisor builds one [`Report`] per tick and hands it to an
//! [`Output`] implementation. The sink is a capability set — header line,
//! data line, free-text status line, last-emitted record — so console,
//! headless, and test-capturing sinks are interchangeable.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// One second's worth of statistics, immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// UTC wall-clock stamp, `[MM-DD-YYYY][HH:MM:SS.micros]`.
    pub timestamp: String,
    /// Whole seconds since the producer started.
    pub secs: u64,

    /// Data rate over the last second, bits/sec.
    pub rate_last: u64,
    /// Trailing average rate over the last (up to) 10 seconds, bits/sec.
    pub rate_10s: u64,
    /// Lifetime average rate, bits/sec.
    pub rate_avg: u64,
    pub rate_min: u64,
    pub rate_max: u64,

    /// Mean jitter over the last second, milliseconds.
    pub jitter_last_ms: f64,
    /// Trailing average jitter over the last (up to) 10 seconds, ms.
    pub jitter_10s_ms: f64,
    /// Lifetime average jitter, ms.
    pub jitter_avg_ms: f64,
    pub jitter_min_ms: f64,
    pub jitter_max_ms: f64,

    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub packets_out_of_order: u64,
}

/// Where the supervisor delivers its once-per-second output.
pub trait Output {
    /// Emits the column header. Called once before the first data line and
    /// again ahead of the final report.
    fn header(&mut self);
    /// Emits one data record.
    fn data_line(&mut self, report: &Report);
    /// Emits a free-text status line (limits reached, final notice).
    fn status_line(&mut self, line: &str);
    /// The most recently emitted record, if any.
    fn last_record(&self) -> Option<Report>;
}

/// Shared handle so the producer (status lines) and the supervisor (data
/// lines) can write to the same sink from their own threads.
pub type OutputHandle = Arc<Mutex<dyn Output + Send>>;

/// Wraps a sink into an [`OutputHandle`].
pub fn output_handle<O: Output + Send + 'static>(output: O) -> OutputHandle {
    Arc::new(Mutex::new(output))
}

/// Console sink writing fixed-width columns to any [`Write`] target.
///
/// The sending side has no jitter or receive counters, so those columns can
/// be switched off; the timestamp column is optional the same way.
pub struct ConsoleOutput<W: Write> {
    writer: W,
    timestamps: bool,
    jitter_columns: bool,
    last: Option<Report>,
}

impl<W: Write> ConsoleOutput<W> {
    pub fn new(writer: W, timestamps: bool, jitter_columns: bool) -> Self {
        Self {
            writer,
            timestamps,
            jitter_columns,
            last: None,
        }
    }
}

impl<W: Write> Output for ConsoleOutput<W> {
    fn header(&mut self) {
        if self.timestamps {
            let _ = write!(self.writer, "                             ");
        }
        let _ = write!(self.writer, "           [ <-------- Data Rate (bps) --------> ]");
        if self.jitter_columns {
            let _ = write!(
                self.writer,
                "[ <---------- Jitter (ms) -----------> ][ <---- Number of Packets ----> ]"
            );
        }
        let _ = writeln!(self.writer);

        if self.timestamps {
            let _ = write!(self.writer, "[                  Timestamp]");
        }
        let _ = write!(self.writer, "[  # Secs ][ Lst Secnd ][  Lst 10 S ][ Snce Strt ]");
        if self.jitter_columns {
            let _ = writeln!(
                self.writer,
                "[ Last Sec ][ Last 10 S ][ Since Start ][ Receivd ][ Dropped ][ OutOrdr ]"
            );
        } else {
            let _ = writeln!(self.writer, "[ # Packets Sent ]");
        }
    }

    fn data_line(&mut self, report: &Report) {
        self.last = Some(report.clone());

        if self.timestamps {
            let _ = write!(self.writer, "{}", report.timestamp);
        }
        let _ = write!(
            self.writer,
            "[ {:7} ][ {:>9} ][ {:>9} ][ {:>9} ]",
            report.secs,
            format_rate(report.rate_last),
            format_rate(report.rate_10s),
            format_rate(report.rate_avg),
        );
        if self.jitter_columns {
            let _ = writeln!(
                self.writer,
                "[ {:8.3} ][ {:9.3} ][ {:11.3} ][ {:7} ][ {:7} ][ {:7} ]",
                report.jitter_last_ms,
                report.jitter_10s_ms,
                report.jitter_avg_ms,
                report.packets_received,
                report.packets_dropped,
                report.packets_out_of_order,
            );
        } else {
            let _ = writeln!(self.writer, "[ {:14} ]", report.packets_sent);
        }
        let _ = self.writer.flush();
    }

    fn status_line(&mut self, line: &str) {
        let _ = writeln!(self.writer, "{line}");
        let _ = self.writer.flush();
    }

    fn last_record(&self) -> Option<Report> {
        self.last.clone()
    }
}

/// Sink that swallows everything. Useful when only the final counters are
/// of interest.
#[derive(Debug, Default)]
pub struct NullOutput {
    last: Option<Report>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Output for NullOutput {
    fn header(&mut self) {}

    fn data_line(&mut self, report: &Report) {
        self.last = Some(report.clone());
    }

    fn status_line(&mut self, _line: &str) {}

    fn last_record(&self) -> Option<Report> {
        self.last.clone()
    }
}

/// Sink that records everything it is handed, for assertions in tests.
#[derive(Debug, Default)]
pub struct CapturingOutput {
    pub headers: usize,
    pub records: Vec<Report>,
    pub status_lines: Vec<String>,
}

impl CapturingOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Output for CapturingOutput {
    fn header(&mut self) {
        self.headers += 1;
    }

    fn data_line(&mut self, report: &Report) {
        self.records.push(report.clone());
    }

    fn status_line(&mut self, line: &str) {
        self.status_lines.push(line.to_string());
    }

    fn last_record(&self) -> Option<Report> {
        self.records.last().cloned()
    }
}

/// Renders a bits/sec figure with a G/M/K prefix, `formatRate` style.
pub fn format_rate(bps: u64) -> String {
    let bpsf = bps as f64;
    let (value, label) = if bps > 1_000_000_000 {
        (bpsf / 1_000_000_000.0, "G")
    } else if bps > 1_000_000 {
        (bpsf / 1_000_000.0, "M")
    } else if bps > 1_000 {
        (bpsf / 1_000.0, "K")
    } else {
        (bpsf, " ")
    };
    format!("{value:5.3}{label}")
}
