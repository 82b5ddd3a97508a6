//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    default_log_format, DEFAULT_END_TIMEOUT_MS, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_WAIT_TICK_MS,
    MAX_END_TIMEOUT_MS, MAX_WAIT_TICK_MS, MIN_END_TIMEOUT_MS, MIN_WAIT_TICK_MS,
};

/// CLI options for the headless EventGhost runner.
#[derive(Debug, Parser, Clone)]
#[command(about = "EventGhost event dispatch engine", author, version)]
pub struct AppConfig {
    /// Macro tree document (YAML or JSON)
    #[arg(long, env = "EVENTGHOST_TREE")]
    pub tree: Option<PathBuf>,

    /// Skip the log line and handler run for events nothing is assigned to
    #[arg(long = "only-log-assigned", default_value_t = false)]
    pub only_log_assigned: bool,

    /// Log every action item as it runs
    #[arg(long = "log-actions", default_value_t = false)]
    pub log_actions: bool,

    /// Log every macro as it is entered
    #[arg(long = "log-macros", default_value_t = false)]
    pub log_macros: bool,

    /// Output format of the automation log on stdout
    #[arg(long = "format", value_enum, default_value_t = default_log_format())]
    pub format: LogFormat,

    /// How long ending an enduring event waits for its release callbacks (milliseconds)
    #[arg(long = "end-timeout-ms", default_value_t = DEFAULT_END_TIMEOUT_MS)]
    pub end_timeout_ms: u64,

    /// Polling interval of the Wait action while watching for a stop request (milliseconds)
    #[arg(long = "wait-tick-ms", default_value_t = DEFAULT_WAIT_TICK_MS)]
    pub wait_tick_ms: u64,

    /// How long to wait for running macros after stdin closes (milliseconds)
    #[arg(long = "idle-timeout-ms", default_value_t = DEFAULT_IDLE_TIMEOUT_MS)]
    pub idle_timeout_ms: u64,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "EVENTGHOST_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "EVENTGHOST_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Enable dispatch timing traces
    #[arg(long)]
    pub log_timings: bool,
}

/// Runtime knobs consumed by the dispatch engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub only_log_assigned: bool,
    pub log_actions: bool,
    pub log_macros: bool,
    pub log_timings: bool,
    /// Upper bound on how long `set_should_end` blocks for release callbacks.
    pub end_timeout: Duration,
    /// Sleep granularity of `Wait` between stop-flag checks.
    pub wait_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            only_log_assigned: false,
            log_actions: false,
            log_macros: false,
            log_timings: false,
            end_timeout: defaults::default_end_timeout(),
            wait_tick: defaults::default_wait_tick(),
        }
    }
}

/// How the binary renders the automation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn label(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}
