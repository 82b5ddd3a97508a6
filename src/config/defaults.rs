use super::LogFormat;
use std::time::Duration;

pub const DEFAULT_END_TIMEOUT_MS: u64 = 3000;
pub const MIN_END_TIMEOUT_MS: u64 = 100;
pub const MAX_END_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_WAIT_TICK_MS: u64 = 100;
pub const MIN_WAIT_TICK_MS: u64 = 5;
pub const MAX_WAIT_TICK_MS: u64 = 1000;

pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;
pub(super) const MAX_IDLE_TIMEOUT_MS: u64 = 600_000;

pub(super) const TREE_EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

pub const fn default_log_format() -> LogFormat {
    LogFormat::Text
}

pub(crate) const fn default_end_timeout() -> Duration {
    Duration::from_millis(DEFAULT_END_TIMEOUT_MS)
}

pub(crate) const fn default_wait_tick() -> Duration {
    Duration::from_millis(DEFAULT_WAIT_TICK_MS)
}
