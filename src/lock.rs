use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, taking the inner value back if a panicking action poisoned it.
///
/// Action bodies run under `catch_unwind`, so a poisoned registry or record
/// must not take the dispatch threads down with it.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}
