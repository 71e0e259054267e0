use std::net::{IpAddr, SocketAddr, UdpSocket};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;
use udprobe::{
    ConsoleOutput, PacedGenerator, ProbeError, Supervisor, UdpAnalyzer, counters, output_handle,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Opts {
    #[command(subcommand)]
    mode: Mode,

    /// Prefix every report line with a UTC timestamp column
    #[arg(long)]
    timestamps: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Receive probe traffic and report rate, loss, reordering and jitter
    Server {
        /// IP to listen on
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Port to listen on
        #[arg(short, long, default_value_t = 5021)]
        port: u16,

        /// Stop after receiving this many bytes (default unlimited)
        #[arg(long)]
        bytes: Option<u64>,

        /// Stop after this many seconds (default unlimited)
        #[arg(long)]
        secs: Option<u64>,
    },

    /// Send paced probe traffic and report the achieved rate
    Client {
        /// host:port of the receiving side
        target: SocketAddr,

        /// Packets per second to send
        #[arg(long, default_value_t = 1000)]
        pps: u64,

        /// Datagram size in bytes, including the 16 byte header
        #[arg(long, default_value_t = 1000)]
        size: usize,

        /// Stop after sending this many bytes (default unlimited)
        #[arg(long)]
        bytes: Option<u64>,

        /// Stop after this many seconds (default unlimited)
        #[arg(long)]
        secs: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let opts = Opts::parse();

    let shared = counters::new_session();

    match opts.mode {
        Mode::Server {
            bind,
            port,
            bytes,
            secs,
        } => {
            let mut sock = UdpSocket::bind((bind, port)).map_err(ProbeError::BindFailed)?;
            info!(%bind, port, "listening");

            let output = output_handle(ConsoleOutput::new(std::io::stdout(), opts.timestamps, true));
            let supervisor = Supervisor::new().spawn(shared.clone(), output.clone());

            UdpAnalyzer::new(bytes, secs).run(&mut sock, &shared, &output)?;
            supervisor
                .join()
                .map_err(|_| anyhow!("supervisor thread panicked"))?;

            info!("last record: {:?}", output.lock().last_record());
        }

        Mode::Client {
            target,
            pps,
            size,
            bytes,
            secs,
        } => {
            let mut sock = UdpSocket::bind("0.0.0.0:0").map_err(ProbeError::BindFailed)?;
            sock.connect(target).map_err(ProbeError::ConnectFailed)?;
            info!(%target, pps, size, "sending");

            let output =
                output_handle(ConsoleOutput::new(std::io::stdout(), opts.timestamps, false));
            let supervisor = Supervisor::new().spawn(shared.clone(), output.clone());

            PacedGenerator::new(pps, size, bytes, secs).run(&mut sock, &shared, &output)?;
            supervisor
                .join()
                .map_err(|_| anyhow!("supervisor thread panicked"))?;

            info!("last record: {:?}", output.lock().last_record());
        }
    }

    Ok(())
}
