//! Default values for every recognised option

/// Standard OMM port
pub const PORT: u16 = 14002;

pub const PING_TIMEOUT_MS: u64 = 30_000;
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

pub const GUARANTEED_OUTPUT_BUFFERS: usize = 100;
pub const MAX_OUTPUT_BUFFERS: usize = 100;
pub const SERVER_POOL_BUFFERS: usize = 1_000;
pub const HIGH_WATER_MARK: usize = 6_144;
/// Also the smallest threshold accepted
pub const COMPRESSION_THRESHOLD: usize = 30;

pub const RECONNECT_MIN_DELAY_MS: u64 = 500;
pub const RECONNECT_MAX_DELAY_MS: u64 = 5_000;

pub const DISPATCH_TIMEOUT_MS: u64 = 100;
pub const LOGIN_TIMEOUT_MS: u64 = 45_000;
pub const DIRECTORY_TIMEOUT_MS: u64 = 45_000;
pub const DICTIONARY_TIMEOUT_MS: u64 = 45_000;
pub const REQUEST_TIMEOUT_MS: u64 = 15_000;

pub const MAX_NESTING_DEPTH: usize = 32;

pub const APPLICATION_ID: &str = "256";
pub const POSITION: &str = "127.0.0.1/net";

// serde `default = "..."` needs functions
pub(crate) fn connect_timeout_ms() -> u64 {
    CONNECT_TIMEOUT_MS
}

pub(crate) fn server_pool_buffers() -> usize {
    SERVER_POOL_BUFFERS
}

pub(crate) fn allow_checksum() -> bool {
    true
}
