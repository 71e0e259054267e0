use std::{io, net::AddrParseError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to bind socket address: {0}")]
    BindFailed(io::Error),

    #[error("Failed to connect to the remote address: {0}")]
    ConnectFailed(io::Error),

    #[error("Udp socket failed to send data: {0}")]
    SendFailed(io::Error),

    #[error("Udp socket failed to receive data: {0}")]
    RecvFailed(io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddrParseError),

    #[error("Datagram of {len} bytes is shorter than the 16 byte header")]
    ShortDatagram { len: usize },

    #[error("Invalid probe configuration: {0}")]
    InvalidConfig(&'static str),
}
