use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ECHO_TIMEOUT, DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, DEFAULT_TTL, DNS_PORT,
};
use crate::error::ConfigBuildError;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Protocol {
    #[default]
    Icmp,
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Icmp => "icmp",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    /// Whether the protocol is probed by the L4 prober and therefore needs a port.
    pub fn is_l4(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icmp" => Ok(Protocol::Icmp),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(ConfigBuildError::UnknownProtocol(other.into())),
        }
    }
}

/// Address of an alternate DNS server.
///
/// Accepts `host`, `ip`, `host:port`, `ip:port` and `[v6]:port`; the port
/// defaults to 53.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct DnsOverride {
    pub host: String,
    pub port: u16,
}

impl FromStr for DnsOverride {
    type Err = ConfigBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigBuildError::InvalidDns(s.into());
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid());
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self {
                host: addr.ip().to_string(),
                port: addr.port(),
            });
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self {
                host: ip.to_string(),
                port: DNS_PORT,
            });
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => Ok(Self {
                host: host.into(),
                port: port.parse().map_err(|_| invalid())?,
            }),
            Some(_) => Err(invalid()),
            None => Ok(Self {
                host: s.into(),
                port: DNS_PORT,
            }),
        }
    }
}

impl fmt::Display for DnsOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parameters of a single invocation. Built once, never mutated.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub host: String,
    pub port: Option<u16>,
    pub protocol: Protocol,
    /// Number of attempts, `0` runs until cancelled.
    pub count: u64,
    pub payload_size: usize,
    pub interval: Duration,
    /// IP time to live for echo requests, echoed in L4 result lines.
    pub ttl: u32,
    /// Upper bound of each L4 phase group (connect, then write and read).
    pub attempt_timeout: Duration,
    pub echo_timeout: Duration,
    pub wait_for_reply: bool,
    pub dns: Option<DnsOverride>,
}

impl ProbeConfig {
    /// `host:port` as printed in the L4 statistics header.
    pub fn target(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub(crate) fn is_unbounded(&self) -> bool {
        self.count == 0
    }
}

#[derive(Clone, Debug)]
pub struct ProbeConfigBuilder {
    host: String,
    port: Option<i64>,
    protocol: Protocol,
    count: u64,
    payload_size: usize,
    interval: Duration,
    ttl: u32,
    attempt_timeout: Option<Duration>,
    echo_timeout: Duration,
    wait_for_reply: bool,
    dns: Option<DnsOverride>,
}

impl ProbeConfigBuilder {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.into(),
            port: None,
            protocol: Protocol::default(),
            count: 0,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            interval: DEFAULT_INTERVAL,
            ttl: DEFAULT_TTL,
            attempt_timeout: None,
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
            wait_for_reply: false,
            dns: None,
        }
    }

    /// A negative port means "no port", the same as not calling this.
    pub fn with_port(mut self, port: i64) -> Self {
        self.port = (port >= 0).then_some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_payload_size(mut self, size: usize) -> Self {
        self.payload_size = size;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Defaults to `ttl` milliseconds when unset.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout = timeout;
        self
    }

    pub fn with_wait_for_reply(mut self, wait: bool) -> Self {
        self.wait_for_reply = wait;
        self
    }

    pub fn with_dns(mut self, dns: DnsOverride) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn build(self) -> Result<ProbeConfig, ConfigBuildError> {
        if self.host.trim().is_empty() {
            return Err(ConfigBuildError::MissingHost);
        }
        let port = self
            .port
            .map(|port| u16::try_from(port).map_err(|_| ConfigBuildError::InvalidPort(port)))
            .transpose()?;
        if self.protocol.is_l4() && port.is_none() {
            return Err(ConfigBuildError::MissingPort);
        }
        Ok(ProbeConfig {
            host: self.host,
            port,
            protocol: self.protocol,
            count: self.count,
            payload_size: self.payload_size,
            interval: self.interval,
            ttl: self.ttl,
            attempt_timeout: self
                .attempt_timeout
                .unwrap_or(Duration::from_millis(u64::from(self.ttl))),
            echo_timeout: self.echo_timeout,
            wait_for_reply: self.wait_for_reply,
            dns: self.dns,
        })
    }
}
