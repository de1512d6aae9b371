use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use log::debug;
use tokio::net::{TcpStream, UdpSocket};
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::config::{DnsOverride, Protocol};
use crate::error::{AttemptError, Error, OpaqueError, Result};

/// Name resolution used by the probers.
///
/// Either the system resolver or an explicitly configured DNS server; the
/// choice is passed around as a value instead of being installed globally.
pub enum Resolver {
    System,
    Override {
        server: SocketAddr,
        resolver: TokioAsyncResolver,
    },
}

impl Resolver {
    pub fn system() -> Self {
        Resolver::System
    }

    /// Checks that the DNS server can be looked up and answers a connection
    /// attempt over `protocol`, both within `timeout`, then resolves every
    /// later lookup through it.
    ///
    /// # Errors
    /// Returns an error if the server address cannot be resolved or the
    /// connection attempt fails.
    pub async fn with_override(
        dns: &DnsOverride,
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<Self> {
        let unreachable = |source: io::Error| Error::DnsUnreachable {
            addr: dns.to_string(),
            source,
        };
        let check = async {
            let server = tokio::net::lookup_host((dns.host.as_str(), dns.port))
                .await
                .map_err(|err| Error::Resolve {
                    host: dns.host.clone(),
                    source: err.into(),
                })?
                .next()
                .ok_or_else(|| Error::NoAddress(dns.host.clone()))?;
            check_reachable(server, protocol).await.map_err(unreachable)?;
            Ok::<_, Error>(server)
        };
        let server = tokio::time::timeout(timeout, check)
            .await
            .map_err(|_| unreachable(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout")))??;
        debug!("using dns server {} for name resolution", server);

        let servers = NameServerConfigGroup::from_ips_clear(&[server.ip()], server.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], servers);
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
        Ok(Resolver::Override { server, resolver })
    }

    /// Resolves `host` to its first address. IP literals are returned as is.
    pub async fn resolve(&self, host: &str) -> std::result::Result<IpAddr, AttemptError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        let resolve_err = |source: OpaqueError| AttemptError::Resolve {
            host: host.into(),
            source,
        };
        let ip = match self {
            Resolver::System => tokio::net::lookup_host((host, 0))
                .await
                .map_err(|err| resolve_err(err.into()))?
                .map(|addr| addr.ip())
                .next(),
            Resolver::Override { resolver, .. } => resolver
                .lookup_ip(host)
                .await
                .map_err(|err| resolve_err(err.into()))?
                .iter()
                .next(),
        };
        let ip = ip.ok_or_else(|| AttemptError::NoAddress(host.into()))?;
        debug!("resolved {} to {}", host, ip);
        Ok(ip)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::System => f.write_str("System"),
            Resolver::Override { server, .. } => {
                f.debug_struct("Override").field("server", server).finish()
            }
        }
    }
}

pub(crate) fn unspecified_for(addr: &SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

async fn check_reachable(server: SocketAddr, protocol: Protocol) -> io::Result<()> {
    match protocol {
        Protocol::Tcp => TcpStream::connect(server).await.map(drop),
        Protocol::Udp | Protocol::Icmp => {
            let socket = UdpSocket::bind(unspecified_for(&server)).await?;
            socket.connect(server).await
        }
    }
}
