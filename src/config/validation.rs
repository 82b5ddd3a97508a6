use super::defaults::{MAX_IDLE_TIMEOUT_MS, TREE_EXTENSIONS};
use super::{
    AppConfig, EngineConfig, MAX_END_TIMEOUT_MS, MAX_WAIT_TICK_MS, MIN_END_TIMEOUT_MS,
    MIN_WAIT_TICK_MS,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize the tree path.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_END_TIMEOUT_MS..=MAX_END_TIMEOUT_MS).contains(&self.end_timeout_ms) {
            bail!(
                "--end-timeout-ms must be between {MIN_END_TIMEOUT_MS} and {MAX_END_TIMEOUT_MS}, got {}",
                self.end_timeout_ms
            );
        }
        if !(MIN_WAIT_TICK_MS..=MAX_WAIT_TICK_MS).contains(&self.wait_tick_ms) {
            bail!(
                "--wait-tick-ms must be between {MIN_WAIT_TICK_MS} and {MAX_WAIT_TICK_MS}, got {}",
                self.wait_tick_ms
            );
        }
        if self.idle_timeout_ms == 0 || self.idle_timeout_ms > MAX_IDLE_TIMEOUT_MS {
            bail!(
                "--idle-timeout-ms must be between 1 and {MAX_IDLE_TIMEOUT_MS}, got {}",
                self.idle_timeout_ms
            );
        }

        if let Some(tree) = &mut self.tree {
            check_tree_extension(tree)?;
            if !tree.is_file() {
                bail!("--tree '{}' does not exist or is not a file", tree.display());
            }
            *tree = tree
                .canonicalize()
                .with_context(|| format!("failed to canonicalize tree path '{}'", tree.display()))?;
        }

        Ok(())
    }

    /// Whether the debug file log and trace file should be written.
    pub fn file_logging_enabled(&self) -> bool {
        (self.logs || self.log_timings) && !self.no_logs
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Snapshot the CLI-controlled dispatch settings for the engine.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            only_log_assigned: self.only_log_assigned,
            log_actions: self.log_actions,
            log_macros: self.log_macros,
            log_timings: self.log_timings,
            end_timeout: Duration::from_millis(self.end_timeout_ms),
            wait_tick: Duration::from_millis(self.wait_tick_ms),
        }
    }
}

pub(super) fn check_tree_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if TREE_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => bail!(
            "--tree must point at a {} document, got '{}'",
            TREE_EXTENSIONS.join("/"),
            path.display()
        ),
    }
}
