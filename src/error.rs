use std::io;
use std::time::Duration;

use thiserror::Error as ThisError;

use crate::config::Protocol;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that abort a whole run before or instead of producing statistics.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] ConfigBuildError),
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: OpaqueError,
    },
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("dns server {addr} is unreachable: {source}")]
    DnsUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open echo session: {0}")]
    Session(#[source] io::Error),
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigBuildError {
    #[error("host is required")]
    MissingHost,
    #[error("the port is not correct, please provide a correct port")]
    MissingPort,
    #[error("invalid port: {0}")]
    InvalidPort(i64),
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),
    #[error("invalid dns server address: {0}")]
    InvalidDns(String),
    #[error("{0} is not handled by this prober")]
    WrongProber(Protocol),
}

/// Failure of a single L4 attempt. Its `Display` is the inline report line.
#[derive(ThisError, Debug)]
pub enum AttemptError {
    #[error("lookup {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: OpaqueError,
    },
    #[error("lookup {0}: no such host")]
    NoAddress(String),
    #[error("dial {addr}: i/o timeout after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },
    #[error("dial {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("write: {0}")]
    Write(#[source] io::Error),
    #[error("partial payload written (size={0})")]
    PartialWrite(usize),
    #[error("read: {0}")]
    Read(#[source] io::Error),
    #[error("{0}: i/o timeout")]
    Deadline(&'static str),
    #[error("no packet received")]
    NoReply,
}
