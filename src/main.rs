use std::process;
use std::time::Duration;

use async_tuping::{
    Console, DnsOverride, ExitStatus, InterruptRelay, ProbeConfig, ProbeConfigBuilder, Protocol,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// A network connectivity testing tool. Supports testing via ICMP, TCP, and UDP.
#[derive(Parser, Debug)]
#[command(name = "tuping", version, about, long_about = None)]
struct Args {
    /// Host to ping
    host: String,

    /// Port to ping, required for tcp and udp
    #[arg(allow_negative_numbers = true)]
    port: Option<i64>,

    /// Protocol to use: icmp, tcp or udp
    #[arg(short, long, default_value = "icmp")]
    protocol: String,

    /// Stop after <count> attempts, 0 runs until interrupted
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    count: i64,

    /// Number of data bytes to be sent
    #[arg(short, long, default_value_t = 64)]
    size: usize,

    /// Milliseconds between sending each attempt
    #[arg(short, long, default_value_t = 1000)]
    interval: u64,

    /// Time to live. For tcp and udp also the per-attempt timeout in milliseconds
    #[arg(short, long, default_value_t = 64)]
    ttl: u32,

    /// Wait for a reply from the server, tcp and udp only
    #[arg(short, long)]
    wait: bool,

    /// DNS server to use instead of the system default, as host or host:port
    #[arg(short, long)]
    dns: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<ProbeConfig, async_tuping::ConfigBuildError> {
        let protocol: Protocol = self.protocol.parse()?;
        // `--ttl` is both the IP time to live and the L4 attempt timeout.
        let mut builder = ProbeConfigBuilder::new(&self.host)
            .with_protocol(protocol)
            .with_count(u64::try_from(self.count).unwrap_or(0))
            .with_payload_size(self.size)
            .with_interval(Duration::from_millis(self.interval))
            .with_ttl(self.ttl)
            .with_attempt_timeout(Duration::from_millis(u64::from(self.ttl)))
            .with_wait_for_reply(self.wait);
        if let Some(port) = self.port {
            builder = builder.with_port(port);
        }
        if let Some(dns) = self.dns.filter(|dns| !dns.is_empty()) {
            builder = builder.with_dns(dns.parse::<DnsOverride>()?);
        }
        builder.build()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            process::exit(ExitStatus::SetupFailure.code());
        }
        Err(err) => err.exit(),
    };
    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(ExitStatus::SetupFailure.code());
        }
    };

    let protocol = config.protocol;
    let token = CancellationToken::new();
    let _relay = InterruptRelay::spawn(token.clone());

    match async_tuping::run(config, Console::stdout(), token).await {
        Ok(status) => process::exit(status.code()),
        Err(err) => {
            let label = match protocol {
                Protocol::Icmp => "icmp",
                Protocol::Tcp | Protocol::Udp => "tcp/udp",
            };
            eprintln!("{} ping failed: {}", label, err);
            process::exit(ExitStatus::SetupFailure.code());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_tuping::{ConfigBuildError, Protocol};
    use clap::Parser;

    use super::Args;

    #[test]
    fn test_icmp_without_port() {
        let config = Args::try_parse_from(["tuping", "example.com"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.protocol, Protocol::Icmp);
        assert_eq!(config.port, None);
        assert_eq!(config.ttl, 64);
        assert_eq!(config.attempt_timeout, Duration::from_millis(64));
    }

    #[test]
    fn test_tcp_flags() {
        let config = Args::try_parse_from([
            "tuping", "example.com", "443", "-p", "tcp", "-c", "3", "-s", "32", "-i", "0", "-t",
            "250", "-w", "-d", "1.1.1.1",
        ])
        .unwrap()
        .into_config()
        .unwrap();
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.port, Some(443));
        assert_eq!(config.count, 3);
        assert_eq!(config.payload_size, 32);
        assert_eq!(config.interval, Duration::ZERO);
        assert_eq!(config.ttl, 250);
        assert_eq!(config.attempt_timeout, Duration::from_millis(250));
        assert!(config.wait_for_reply);
        assert_eq!(config.dns.unwrap().to_string(), "1.1.1.1:53");
    }

    #[test]
    fn test_negative_count_is_unbounded() {
        let config = Args::try_parse_from(["tuping", "example.com", "-c", "-5"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.count, 0);
    }

    #[test]
    fn test_setup_errors() {
        let err = Args::try_parse_from(["tuping", "example.com", "-p", "udp"])
            .unwrap()
            .into_config()
            .unwrap_err();
        assert_eq!(err, ConfigBuildError::MissingPort);

        let err = Args::try_parse_from(["tuping", "example.com", "-1", "-p", "tcp"])
            .unwrap()
            .into_config()
            .unwrap_err();
        assert_eq!(err, ConfigBuildError::MissingPort);

        let err = Args::try_parse_from(["tuping", "example.com", "80", "-p", "sctp"])
            .unwrap()
            .into_config()
            .unwrap_err();
        assert_eq!(err, ConfigBuildError::UnknownProtocol("sctp".into()));
    }
}
