use super::record::{EventRecord, RecordHooks, RecordState};
use super::{EventRequest, PendingTrigger, TriggerKind};
use crate::lock_or_recover;
use crate::log_debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Process-wide map from event string to its live record.
///
/// Lock order is registry first, then the record's queue. Both resolving a
/// trigger and retiring a drained record happen under the registry lock, so a
/// trigger can never land on a record that is being removed.
#[derive(Default)]
pub struct EventRegistry {
    records: Mutex<HashMap<String, Arc<EventRecord>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the record for the request's string and queue the
    /// payload/source pair on it.
    pub(crate) fn resolve(
        &self,
        request: EventRequest,
        kind: TriggerKind,
        hooks: &RecordHooks,
    ) -> Arc<EventRecord> {
        let string = request.string();
        let mut records = lock_or_recover(&self.records, "EventRegistry::resolve");
        let record = records
            .entry(string)
            .or_insert_with(|| {
                Arc::new(EventRecord::new(
                    &request.prefix,
                    &request.suffix,
                    hooks.clone(),
                ))
            })
            .clone();
        record.enqueue_trigger(PendingTrigger {
            payload: request.payload,
            source: request.source,
            kind,
        });
        record
    }

    /// Next trigger for `record`'s worker. When its queue is empty the worker
    /// stands down, and the record is dropped from the map unless a trigger
    /// is still waiting for its `execute`.
    pub(crate) fn next_work(&self, record: &Arc<EventRecord>) -> Option<PendingTrigger> {
        let mut records = lock_or_recover(&self.records, "EventRegistry::next_work");
        let mut queue = lock_or_recover(&record.queue, "EventRegistry::next_work");

        while let Some(ticket) = queue.work.pop_front() {
            if let Some(trigger) = queue.pending.pop_front() {
                queue.state = RecordState::Running;
                tracing::trace!(
                    event = %record.string(),
                    queued_us = ticket.queued_at.elapsed().as_micros() as u64,
                    "dispatch dequeued"
                );
                return Some(trigger);
            }
            log_debug(&format!(
                "dispatch ticket for '{}' had no pending trigger",
                record.string()
            ));
        }

        queue.worker_active = false;
        if queue.pending.is_empty() {
            let owned = records
                .get(record.string())
                .is_some_and(|live| Arc::ptr_eq(live, record));
            if owned {
                records.remove(record.string());
            }
            queue.retired = true;
        }
        None
    }

    /// The live record for `string`, if any.
    pub fn get(&self, string: &str) -> Option<Arc<EventRecord>> {
        lock_or_recover(&self.records, "EventRegistry::get")
            .get(string)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.records, "EventRegistry::len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strings of every live record, sorted.
    pub fn strings(&self) -> Vec<String> {
        let mut strings: Vec<String> = lock_or_recover(&self.records, "EventRegistry::strings")
            .keys()
            .cloned()
            .collect();
        strings.sort();
        strings
    }
}
