//! The automation log: what the user sees about each dispatch.

use crate::actions::{ActionValue, MacroError};
use crate::event::DispatchInfo;
use crate::lock_or_recover;
use std::sync::Mutex;

/// Sink for dispatch output. Called from the action thread only.
pub trait EventLog: Send + Sync {
    /// Every dispatch, before the assigned-handler check.
    fn observe_event(&self, _info: &DispatchInfo) {}

    /// The event line itself.
    fn log_event(&self, info: &DispatchInfo);

    /// Macro and action trace lines, indented by nesting depth.
    fn log_item(&self, info: &DispatchInfo, indent: usize, text: &str);

    fn log_error(&self, info: &DispatchInfo, error: &MacroError);

    /// Progress through the handler list, 0 to 100.
    fn set_event_meter(&self, _percent: f32) {}
}

/// Forwards the automation log to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn log_event(&self, info: &DispatchInfo) {
        tracing::info!(
            event = %info.string,
            payload = ?info.payload,
            source = %info.source,
            sequence = info.sequence,
            "event"
        );
    }

    fn log_item(&self, info: &DispatchInfo, indent: usize, text: &str) {
        tracing::info!(event = %info.string, indent, "{text}");
    }

    fn log_error(&self, info: &DispatchInfo, error: &MacroError) {
        tracing::error!(event = %info.string, "{error:#}");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Observed(String),
    Event {
        string: String,
        payload: Option<ActionValue>,
    },
    Item {
        indent: usize,
        text: String,
    },
    Error {
        string: String,
        message: String,
        stopped: bool,
    },
}

/// Keeps every entry in memory; handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
    meter: Mutex<Vec<f32>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        lock_or_recover(&self.entries, "MemoryLog::entries").clone()
    }

    /// Strings of the logged event lines, in order.
    pub fn events(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Event { string, .. } => Some(string),
                _ => None,
            })
            .collect()
    }

    pub fn items(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Item { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn meter_readings(&self) -> Vec<f32> {
        lock_or_recover(&self.meter, "MemoryLog::meter_readings").clone()
    }

    fn push(&self, entry: LogEntry) {
        lock_or_recover(&self.entries, "MemoryLog::push").push(entry);
    }
}

impl EventLog for MemoryLog {
    fn observe_event(&self, info: &DispatchInfo) {
        self.push(LogEntry::Observed(info.string.clone()));
    }

    fn log_event(&self, info: &DispatchInfo) {
        self.push(LogEntry::Event {
            string: info.string.clone(),
            payload: info.payload.clone(),
        });
    }

    fn log_item(&self, _info: &DispatchInfo, indent: usize, text: &str) {
        self.push(LogEntry::Item {
            indent,
            text: text.to_string(),
        });
    }

    fn log_error(&self, info: &DispatchInfo, error: &MacroError) {
        self.push(LogEntry::Error {
            string: info.string.clone(),
            message: format!("{error:#}"),
            stopped: error.is_stop(),
        });
    }

    fn set_event_meter(&self, percent: f32) {
        lock_or_recover(&self.meter, "MemoryLog::set_event_meter").push(percent);
    }
}
