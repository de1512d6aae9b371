use std::net::IpAddr;

use log::{debug, warn};
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence, SurgeError, ICMP};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{ProbeConfig, Protocol};
use crate::console::Console;
use crate::constants::PAYLOAD_FILLER;
use crate::error::{ConfigBuildError, Error, Result};
use crate::resolver::Resolver;
use crate::stats::{Completion, ExitStatus, RttStats, Summary, Tally};

/// Echo request/reply session driven through `surge-ping`.
#[derive(Debug)]
pub struct IcmpProber {
    config: ProbeConfig,
    resolver: Resolver,
    tally: Tally,
    rtt: RttStats,
    completion: Completion,
    console: Console,
}

impl IcmpProber {
    /// # Errors
    /// Returns an error if the configuration is not an ICMP one or a
    /// configured DNS server is unreachable.
    pub async fn new(config: ProbeConfig, console: Console) -> Result<Self> {
        if config.protocol != Protocol::Icmp {
            return Err(ConfigBuildError::WrongProber(config.protocol).into());
        }
        let resolver = match &config.dns {
            Some(dns) => Resolver::with_override(dns, config.protocol, config.echo_timeout).await?,
            None => Resolver::system(),
        };
        Ok(Self {
            config,
            resolver,
            tally: Tally::new(),
            rtt: RttStats::new(),
            completion: Completion::new(),
            console,
        })
    }

    /// Exchanges echoes until `count` is reached or `token` is cancelled, then
    /// prints the statistics. Echoes start `interval` apart, the wait for a
    /// reply counts towards it.
    ///
    /// # Errors
    /// Returns an error if the host cannot be resolved or the echo socket
    /// cannot be opened.
    pub async fn run(&mut self, token: &CancellationToken) -> Result<ExitStatus> {
        let resolved = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            resolved = self.resolver.resolve(&self.config.host) => Some(resolved),
        };
        let ip = match resolved {
            Some(resolved) => resolved.map_err(|err| Error::Opaque(err.into()))?,
            None => {
                debug!("interrupted while resolving {}", self.config.host);
                return Ok(self.finish());
            }
        };
        let kind = match ip {
            IpAddr::V4(_) => ICMP::V4,
            IpAddr::V6(_) => ICMP::V6,
        };
        let client = Client::new(&Config::builder().kind(kind).ttl(self.config.ttl).build())
            .map_err(Error::Session)?;
        let mut pinger = client
            .pinger(ip, PingIdentifier(std::process::id() as u16))
            .await;
        pinger.timeout(self.config.echo_timeout);
        if token.is_cancelled() {
            return Ok(self.finish());
        }

        let payload = vec![PAYLOAD_FILLER; self.config.payload_size];
        self.console.line(format_args!(
            "PING {} ({}) {}",
            self.config.host, ip, self.config.payload_size
        ));

        let mut seq = 0u64;
        while !token.is_cancelled() {
            let sent_at = Instant::now();
            let reply = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                reply = pinger.ping(PingSequence(seq as u16), &payload) => reply,
            };
            match reply {
                Ok((packet, rtt)) => {
                    self.tally.record_received();
                    self.rtt.add(rtt);
                    let (bytes, source, ttl) = describe(&packet);
                    self.console.line(format_args!(
                        "{} bytes from {}: icmp_seq={} ttl={} time={:?}",
                        bytes, source, seq, ttl, rtt
                    ));
                }
                Err(SurgeError::Timeout { .. }) => {
                    self.tally.record_dropped();
                    debug!("echo {} to {} timed out", seq, ip);
                }
                Err(err) => {
                    self.tally.record_dropped();
                    warn!("echo {} to {} failed, reason: {}", seq, ip, err);
                }
            }
            seq += 1;

            if !self.config.is_unbounded() && seq >= self.config.count {
                break;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep_until(sent_at + self.config.interval) => {}
            }
        }
        Ok(self.finish())
    }

    pub fn summary(&self) -> Summary {
        self.tally.summary()
    }

    /// Prints the statistics block once and returns the exit status.
    pub fn finish(&self) -> ExitStatus {
        self.completion.finish(|| {
            let summary = self.tally.summary();
            self.console.line(format_args!(""));
            self.console.line(format_args!("--- {} ping statistics ---", self.config.host));
            self.console.line(format_args!(
                "{} packets transmitted, {} received, {}% packet loss",
                summary.transmitted(),
                summary.received,
                summary.loss_percent()
            ));
            self.console.line(format_args!(
                "round-trip min/avg/max/stddev = {:?}/{:?}/{:?}/{:?}",
                self.rtt.min(),
                self.rtt.avg(),
                self.rtt.max(),
                self.rtt.stddev()
            ));
            summary.exit_status()
        })
    }
}

fn describe(packet: &IcmpPacket) -> (usize, IpAddr, String) {
    match packet {
        IcmpPacket::V4(packet) => (
            packet.get_size(),
            IpAddr::V4(packet.get_source()),
            packet
                .get_ttl()
                .map_or_else(|| "?".to_string(), |ttl| ttl.to_string()),
        ),
        IcmpPacket::V6(packet) => (
            packet.get_size(),
            IpAddr::V6(packet.get_source()),
            packet.get_max_hop_limit().to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::{Duration, Instant};

    use tokio_util::sync::CancellationToken;

    use super::IcmpProber;
    use crate::config::{ProbeConfigBuilder, Protocol};
    use crate::console::testing::Captured;
    use crate::error::{ConfigBuildError, Error};
    use crate::stats::{ExitStatus, Summary};

    /// `None` when the sandbox does not allow opening ICMP sockets.
    async fn run_allowed(
        prober: &mut IcmpProber,
        token: &CancellationToken,
    ) -> Option<ExitStatus> {
        match prober.run(token).await {
            Err(Error::Session(err)) if err.kind() == io::ErrorKind::PermissionDenied => None,
            result => Some(result.unwrap()),
        }
    }

    #[tokio::test]
    async fn test_rejects_l4_config() {
        let (console, _captured) = Captured::console();
        let config = ProbeConfigBuilder::new("127.0.0.1")
            .with_protocol(Protocol::Udp)
            .with_port(53)
            .build()
            .unwrap();
        let result = IcmpProber::new(config, console).await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigBuildError::WrongProber(Protocol::Udp)))
        ));
    }

    #[tokio::test]
    async fn test_finish_without_echoes() {
        let (console, captured) = Captured::console();
        let config = ProbeConfigBuilder::new("localhost").build().unwrap();
        let prober = IcmpProber::new(config, console).await.unwrap();

        assert_eq!(prober.finish(), ExitStatus::Success);
        assert_eq!(prober.finish(), ExitStatus::Success);
        assert_eq!(
            captured.lines(),
            vec![
                "".to_string(),
                "--- localhost ping statistics ---".to_string(),
                "0 packets transmitted, 0 received, 0% packet loss".to_string(),
                "round-trip min/avg/max/stddev = 0ns/0ns/0ns/0ns".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_resolution_skips_banner() {
        let (console, captured) = Captured::console();
        let config = ProbeConfigBuilder::new("localhost").build().unwrap();
        let mut prober = IcmpProber::new(config, console).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let status = prober.run(&token).await.unwrap();

        assert_eq!(status, ExitStatus::Success);
        let lines = captured.lines();
        assert!(!lines.iter().any(|line| line.starts_with("PING ")));
        assert_eq!(
            lines.iter().filter(|line| line.contains("ping statistics")).count(),
            1
        );
        assert!(lines.contains(&"0 packets transmitted, 0 received, 0% packet loss".to_string()));
    }

    #[tokio::test]
    async fn test_loopback_echoes() {
        let (console, captured) = Captured::console();
        let config = ProbeConfigBuilder::new("127.0.0.1")
            .with_count(2)
            .with_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let mut prober = IcmpProber::new(config, console).await.unwrap();

        let Some(status) = run_allowed(&mut prober, &CancellationToken::new()).await else {
            return;
        };

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(
            prober.summary(),
            Summary {
                received: 2,
                dropped: 0
            }
        );
        let lines = captured.lines();
        assert_eq!(lines[0], "PING 127.0.0.1 (127.0.0.1) 64");
        for seq in 0..2 {
            let needle = format!(" bytes from 127.0.0.1: icmp_seq={} ttl=", seq);
            assert_eq!(lines.iter().filter(|line| line.contains(&needle)).count(), 1);
        }
        assert!(lines.contains(&"2 packets transmitted, 2 received, 0% packet loss".to_string()));
    }

    #[tokio::test]
    async fn test_unanswered_echoes_are_dropped() {
        let (console, captured) = Captured::console();
        let config = ProbeConfigBuilder::new("192.0.2.1")
            .with_count(2)
            .with_interval(Duration::from_millis(200))
            .with_echo_timeout(Duration::from_millis(150))
            .build()
            .unwrap();
        let mut prober = IcmpProber::new(config, console).await.unwrap();

        let started = Instant::now();
        let Some(status) = run_allowed(&mut prober, &CancellationToken::new()).await else {
            return;
        };

        assert_eq!(status, ExitStatus::TotalLoss);
        assert_eq!(
            prober.summary(),
            Summary {
                received: 0,
                dropped: 2
            }
        );
        // The second echo leaves `interval` after the first, not after its timeout.
        assert!(started.elapsed() < Duration::from_millis(450));
        assert!(captured
            .lines()
            .contains(&"2 packets transmitted, 0 received, 100% packet loss".to_string()));
    }
}
