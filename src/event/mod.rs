//! Event records: one live record per event string, plus the trigger types
//! plugins use to raise them.

mod record;
mod registry;
#[cfg(test)]
mod tests;

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

pub use record::{EventRecord, RecordState};
pub(crate) use record::RecordHooks;
pub use registry::EventRegistry;

use crate::actions::ActionValue;
use crate::workers::WorkerError;

pub const DEFAULT_PREFIX: &str = "Main";
pub const DEFAULT_SOURCE: &str = "eg";

/// `prefix.suffix`, or the prefix alone when there is no suffix.
pub fn event_string(prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}.{suffix}")
    }
}

/// Whether a dispatch ends on its own or waits for an explicit end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Instant,
    /// Held until `EventRecord::set_should_end`, like a pressed button.
    Enduring,
}

/// What a plugin hands to `trigger`/`trigger_enduring`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    pub prefix: String,
    pub suffix: String,
    pub payload: Option<ActionValue>,
    pub source: String,
}

impl EventRequest {
    pub fn new(suffix: &str) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            suffix: suffix.to_string(),
            payload: None,
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn payload(mut self, payload: ActionValue) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn string(&self) -> String {
        event_string(&self.prefix, &self.suffix)
    }
}

/// One queued occurrence. Payload and source travel together so repeated
/// triggers can never desynchronize them.
#[derive(Debug, Clone)]
pub(crate) struct PendingTrigger {
    pub(crate) payload: Option<ActionValue>,
    pub(crate) source: String,
    pub(crate) kind: TriggerKind,
}

/// Snapshot of the occurrence a dispatch is working on.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchInfo {
    pub string: String,
    pub prefix: String,
    pub suffix: String,
    pub payload: Option<ActionValue>,
    pub source: String,
    pub kind: TriggerKind,
    /// Logical timestamp; strictly increasing across all dispatches.
    pub sequence: u64,
    #[serde(skip)]
    pub time: Instant,
}

/// Raising new events from inside a running macro.
pub trait EventTrigger: Send + Sync {
    fn trigger(&self, request: EventRequest) -> Result<Arc<EventRecord>, WorkerError>;

    fn trigger_enduring(&self, request: EventRequest) -> Result<Arc<EventRecord>, WorkerError>;
}

/// Drives a record's private queue. Implemented by the engine's dispatcher.
pub(crate) trait RecordRunner: Send + Sync {
    /// Pop the next trigger, or retire the record once nothing is left.
    fn next_work(&self, record: &Arc<EventRecord>) -> Option<PendingTrigger>;

    /// Run one dispatch to completion on the action thread.
    fn dispatch(self: Arc<Self>, record: &Arc<EventRecord>, trigger: PendingTrigger);
}
