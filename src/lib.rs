//! Connectivity checks over ICMP, TCP and UDP.
//!
//! ICMP runs a plain echo session. TCP and UDP have no echo of their own, so
//! each probe opens a connection, writes a payload and optionally waits for a
//! reply, timing every phase and counting the attempt as received or dropped.
//!
//! ## Example
//! ```rust,no_run
//! use async_tuping::{Console, ProbeConfigBuilder, Protocol};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ProbeConfigBuilder::new("example.com")
//!     .with_protocol(Protocol::Tcp)
//!     .with_port(80)
//!     .with_count(3)
//!     .build()
//!     .expect("invalid probe configuration");
//! tokio_test::block_on(async {
//!     let status = async_tuping::run(config, Console::stdout(), CancellationToken::new())
//!         .await
//!         .unwrap();
//!     std::process::exit(status.code());
//! })
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod icmp;
pub mod interrupt;
pub mod l4;
pub mod resolver;
pub mod stats;

pub(crate) mod constants;

pub use config::{DnsOverride, ProbeConfig, ProbeConfigBuilder, Protocol};
pub use console::Console;
pub use constants::{DEFAULT_ECHO_TIMEOUT, DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, DEFAULT_TTL};
pub use error::{AttemptError, ConfigBuildError, Error, Result};
pub use icmp::IcmpProber;
pub use interrupt::InterruptRelay;
pub use l4::L4Prober;
pub use resolver::Resolver;
pub use stats::{ExitStatus, Summary};

use tokio_util::sync::CancellationToken;

/// Probes the configured target with the prober matching its protocol.
///
/// Runs until `count` attempts are done or `token` is cancelled and returns the
/// loss-aware exit status after printing the statistics.
///
/// # Errors
/// Returns an error when no probe could be run at all: unresolvable host for
/// ICMP, echo socket failure, or an unreachable DNS server.
pub async fn run(
    config: ProbeConfig,
    console: Console,
    token: CancellationToken,
) -> Result<ExitStatus> {
    match config.protocol {
        Protocol::Icmp => IcmpProber::new(config, console).await?.run(&token).await,
        Protocol::Tcp | Protocol::Udp => Ok(L4Prober::new(config, console).await?.run(&token).await),
    }
}
