use std::time::Duration;

pub(crate) const PAYLOAD_FILLER: u8 = 0x0a;
pub(crate) const REPLY_BUF_LEN: usize = 1024;
pub(crate) const DNS_PORT: u16 = 53;

pub const DEFAULT_PAYLOAD_SIZE: usize = 64;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_TTL: u32 = 64;
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_secs(1);
