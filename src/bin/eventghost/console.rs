use eventghost::{DispatchInfo, EventLog, LogFormat, MacroError};
use serde_json::json;
use std::io::{self, Write};

/// Writes the automation log to stdout, one line per entry.
pub(crate) struct ConsoleLog {
    format: LogFormat,
}

impl ConsoleLog {
    pub(crate) fn new(format: LogFormat) -> Self {
        Self { format }
    }

    fn emit(&self, text: String, value: serde_json::Value) {
        let line = match self.format {
            LogFormat::Text => text,
            LogFormat::Json => value.to_string(),
        };
        let mut stdout = io::stdout().lock();
        // A closed pipe on stdout must not take the action thread down with it.
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
}

pub(crate) fn event_line(info: &DispatchInfo) -> String {
    match &info.payload {
        Some(payload) => format!("{} {payload}", info.string),
        None => info.string.clone(),
    }
}

pub(crate) fn item_line(indent: usize, text: &str) -> String {
    format!("{}{text}", "  ".repeat(indent))
}

pub(crate) fn error_line(info: &DispatchInfo, error: &MacroError) -> String {
    if error.is_stop() {
        format!("{}: {error}", info.string)
    } else {
        format!("Error in {}: {error:#}", info.string)
    }
}

impl EventLog for ConsoleLog {
    fn log_event(&self, info: &DispatchInfo) {
        self.emit(
            event_line(info),
            json!({"type": "event", "event": info}),
        );
    }

    fn log_item(&self, info: &DispatchInfo, indent: usize, text: &str) {
        self.emit(
            item_line(indent, text),
            json!({"type": "item", "event": info.string, "indent": indent, "text": text}),
        );
    }

    fn log_error(&self, info: &DispatchInfo, error: &MacroError) {
        tracing::warn!(event = %info.string, stopped = error.is_stop(), "{error:#}");
        self.emit(
            error_line(info, error),
            json!({
                "type": "error",
                "event": info.string,
                "stopped": error.is_stop(),
                "message": format!("{error:#}"),
            }),
        );
    }
}
