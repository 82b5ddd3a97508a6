//! Notification listeners and the busy/idle hook for the host shell.

use crate::actions::ActionValue;
use crate::event::{DispatchInfo, EventRecord};
use crate::lock_or_recover;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// What a listener is told about.
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    /// An event string is about to be dispatched. Returning true from the
    /// listener claims it and the handlers are skipped.
    Event(&'a DispatchInfo),
    /// A plain `notify` call.
    Value(Option<&'a ActionValue>),
}

pub type Listener = Arc<dyn Fn(Notice<'_>) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct NotificationRegistry {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<F>(&self, notification: &str, listener: F) -> ListenerId
    where
        F: Fn(Notice<'_>) -> bool + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock_or_recover(&self.listeners, "NotificationRegistry::bind")
            .entry(notification.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove one listener. Returns false if it was not bound.
    pub fn unbind(&self, notification: &str, id: ListenerId) -> bool {
        let mut listeners = lock_or_recover(&self.listeners, "NotificationRegistry::unbind");
        let Some(bound) = listeners.get_mut(notification) else {
            return false;
        };
        let before = bound.len();
        bound.retain(|(bound_id, _)| *bound_id != id);
        let removed = bound.len() != before;
        if bound.is_empty() {
            listeners.remove(notification);
        }
        removed
    }

    /// Call every listener of `notification`; returns how many ran.
    pub fn notify(&self, notification: &str, value: Option<&ActionValue>) -> usize {
        let snapshot = self.snapshot(notification);
        for listener in &snapshot {
            listener(Notice::Value(value));
        }
        snapshot.len()
    }

    pub fn has_listeners(&self, notification: &str) -> bool {
        lock_or_recover(&self.listeners, "NotificationRegistry::has_listeners")
            .contains_key(notification)
    }

    /// Offer a dispatch to the listeners of its exact string. Stops at the
    /// first listener that claims it.
    pub(crate) fn consult(&self, info: &DispatchInfo) -> bool {
        self.snapshot(&info.string)
            .iter()
            .any(|listener| listener(Notice::Event(info)))
    }

    // Listeners run outside the lock so they may bind or unbind.
    fn snapshot(&self, notification: &str) -> Vec<Listener> {
        lock_or_recover(&self.listeners, "NotificationRegistry::snapshot")
            .get(notification)
            .map(|bound| bound.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Idle,
    Busy,
}

/// Told when a dispatch starts and when its event ends, for a busy indicator.
pub trait ProcessingStateNotifier: Send + Sync {
    fn set_processing_state(&self, state: ProcessingState, record: &EventRecord);
}

/// Shared, replaceable notifier handed to every record.
#[derive(Clone, Default)]
pub(crate) struct NotifierSlot(Arc<Mutex<Option<Arc<dyn ProcessingStateNotifier>>>>);

impl NotifierSlot {
    pub(crate) fn set(&self, notifier: Option<Arc<dyn ProcessingStateNotifier>>) {
        *lock_or_recover(&self.0, "NotifierSlot::set") = notifier;
    }

    pub(crate) fn notify(&self, state: ProcessingState, record: &EventRecord) {
        let notifier = lock_or_recover(&self.0, "NotifierSlot::notify").clone();
        if let Some(notifier) = notifier {
            notifier.set_processing_state(state, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notify_reaches_bound_listeners_until_unbound() {
        let registry = NotificationRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = registry.bind("Volume", move |notice| {
            if let Notice::Value(value) = notice {
                sink.lock().unwrap().push(value.cloned());
            }
            false
        });

        assert_eq!(registry.notify("Volume", Some(&json!(40))), 1);
        assert_eq!(registry.notify("Other", None), 0);
        assert!(registry.unbind("Volume", id));
        assert!(!registry.unbind("Volume", id));
        assert_eq!(registry.notify("Volume", None), 0);
        assert!(!registry.has_listeners("Volume"));
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(40))]);
    }

    #[test]
    fn listener_may_unbind_itself_while_notified() {
        let registry = Arc::new(NotificationRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&registry);
        let counter = Arc::clone(&calls);
        let id = Arc::new(Mutex::new(None));
        let own_id = Arc::clone(&id);
        let bound = registry.bind("Once", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *own_id.lock().unwrap() {
                inner.unbind("Once", id);
            }
            false
        });
        *id.lock().unwrap() = Some(bound);

        registry.notify("Once", None);
        registry.notify("Once", None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
