use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{ProbeConfig, Protocol};
use crate::console::Console;
use crate::constants::{PAYLOAD_FILLER, REPLY_BUF_LEN};
use crate::error::{AttemptError, ConfigBuildError, Error, Result};
use crate::resolver::{unspecified_for, Resolver};
use crate::stats::{Completion, ExitStatus, Summary, Tally};

/// Transport connection of a single attempt, closed on drop.
#[derive(Debug)]
enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Connection {
    async fn open(protocol: Protocol, addr: SocketAddr) -> io::Result<Self> {
        match protocol {
            Protocol::Tcp => Ok(Connection::Tcp(TcpStream::connect(addr).await?)),
            Protocol::Udp => {
                let socket = UdpSocket::bind(unspecified_for(&addr)).await?;
                socket.connect(addr).await?;
                Ok(Connection::Udp(socket))
            }
            Protocol::Icmp => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "icmp is not a transport protocol",
            )),
        }
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Connection::Tcp(stream) => stream.peer_addr(),
            Connection::Udp(socket) => socket.peer_addr(),
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.write(buf).await,
            Connection::Udp(socket) => socket.send(buf).await,
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.read(buf).await,
            Connection::Udp(socket) => socket.recv(buf).await,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Direction {
    To,
    From,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::To => f.write_str("to"),
            Direction::From => f.write_str("from"),
        }
    }
}

/// Successful attempt.
#[derive(Copy, Clone, Debug)]
struct Echo {
    peer: SocketAddr,
    bytes: usize,
    direction: Direction,
    rtt: Duration,
}

/// Ping emulation over TCP connects or UDP datagrams.
///
/// Every attempt opens a fresh connection, writes a fixed payload and, in
/// wait mode, reads a reply. Attempts run strictly one after another and each
/// one counts as either received or dropped.
#[derive(Debug)]
pub struct L4Prober {
    config: ProbeConfig,
    port: u16,
    resolver: Resolver,
    payload: Vec<u8>,
    tally: Tally,
    completion: Completion,
    console: Console,
    announced: bool,
}

impl L4Prober {
    /// Creates a prober for a TCP or UDP configuration.
    ///
    /// A configured DNS server is checked here, before any attempt is made.
    ///
    /// # Errors
    /// Returns an error if the configuration has no port or the DNS server is
    /// unreachable.
    pub async fn new(config: ProbeConfig, console: Console) -> Result<Self> {
        if !config.protocol.is_l4() {
            return Err(ConfigBuildError::WrongProber(config.protocol).into());
        }
        let port = config.port.ok_or(Error::Config(ConfigBuildError::MissingPort))?;
        let resolver = match &config.dns {
            Some(dns) => Resolver::with_override(dns, config.protocol, config.attempt_timeout).await?,
            None => Resolver::system(),
        };
        Ok(Self {
            port,
            resolver,
            payload: vec![PAYLOAD_FILLER; config.payload_size],
            tally: Tally::new(),
            completion: Completion::new(),
            console,
            announced: false,
            config,
        })
    }

    /// Runs attempts until `count` is reached or `token` is cancelled, then
    /// prints the statistics.
    pub async fn run(&mut self, token: &CancellationToken) -> ExitStatus {
        let mut seq = 0u64;
        while !token.is_cancelled() {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = self.attempt(seq) => outcome,
            };
            self.record(seq, outcome);
            seq += 1;

            if !self.config.is_unbounded() && seq >= self.config.count {
                break;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        if token.is_cancelled() {
            debug!("pinging {} interrupted after {} attempts", self.config.target(), seq);
        }
        self.finish()
    }

    pub fn summary(&self) -> Summary {
        self.tally.summary()
    }

    /// Prints the statistics block and returns the exit status. Only the first
    /// call prints.
    pub fn finish(&self) -> ExitStatus {
        self.completion.finish(|| {
            let summary = self.tally.summary();
            self.console.line(format_args!(""));
            self.console.line(format_args!("--- {} ping statistics ---", self.config.target()));
            self.console.line(format_args!(
                "{} packets transmitted, {} received, {:.2}% packet loss",
                summary.transmitted(),
                summary.received,
                summary.loss_percent()
            ));
            summary.exit_status()
        })
    }

    fn record(&self, seq: u64, outcome: std::result::Result<Echo, AttemptError>) {
        match outcome {
            Ok(echo) => {
                self.tally.record_received();
                self.console.line(format_args!(
                    "{} bytes {} {} {}_seq={} ttl={} time={:.3} ms",
                    echo.bytes,
                    echo.direction,
                    echo.peer,
                    self.config.protocol,
                    seq,
                    self.config.ttl,
                    echo.rtt.as_secs_f64() * 1000.0
                ));
            }
            Err(err) => {
                self.tally.record_dropped();
                self.console.line(format_args!("{} for seq={}", err, seq));
            }
        }
    }

    fn announce(&mut self, peer: SocketAddr) {
        if !self.announced {
            self.console.line(format_args!(
                "PING {} ({}) {}",
                self.config.host, peer, self.config.payload_size
            ));
            self.announced = true;
        }
    }

    async fn connect(&self) -> std::result::Result<Connection, AttemptError> {
        let ip = self.resolver.resolve(&self.config.host).await?;
        let addr = SocketAddr::new(ip, self.port);
        trace!("opening {} connection to {}", self.config.protocol, addr);
        Connection::open(self.config.protocol, addr)
            .await
            .map_err(|source| AttemptError::Connect {
                addr: self.config.target(),
                source,
            })
    }

    async fn attempt(&mut self, seq: u64) -> std::result::Result<Echo, AttemptError> {
        let timeout = self.config.attempt_timeout;
        trace!("attempt {} to {}", seq, self.config.target());

        let started = Instant::now();
        let mut conn = tokio::time::timeout(timeout, self.connect())
            .await
            .map_err(|_| AttemptError::ConnectTimeout {
                addr: self.config.target(),
                timeout,
            })??;
        let connect_time = started.elapsed();

        let peer = conn.peer_addr().map_err(|source| AttemptError::Connect {
            addr: self.config.target(),
            source,
        })?;
        self.announce(peer);

        let deadline = Instant::now() + timeout;
        let started = Instant::now();
        let written = tokio::time::timeout_at(deadline, conn.write(&self.payload))
            .await
            .map_err(|_| AttemptError::Deadline("write"))?
            .map_err(AttemptError::Write)?;
        let write_time = started.elapsed();
        if written != self.payload.len() {
            return Err(AttemptError::PartialWrite(written));
        }

        let mut echo = Echo {
            peer,
            bytes: written,
            direction: Direction::To,
            rtt: connect_time + write_time,
        };
        if self.config.wait_for_reply {
            let mut buf = [0; REPLY_BUF_LEN];
            let started = Instant::now();
            let read = tokio::time::timeout_at(deadline, conn.read(&mut buf))
                .await
                .map_err(|_| AttemptError::Deadline("read"))?
                .map_err(AttemptError::Read)?;
            if read == 0 {
                return Err(AttemptError::NoReply);
            }
            echo.rtt += started.elapsed();
            echo.bytes = read;
            echo.direction = Direction::From;
        }
        Ok(echo)
    }
}
