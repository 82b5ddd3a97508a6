use super::record::DispatchTicket;
use super::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

fn request(suffix: &str, payload: i64, source: &str) -> EventRequest {
    EventRequest::new(suffix).payload(json!(payload)).source(source)
}

fn push_ticket(record: &EventRecord) {
    record
        .queue
        .lock()
        .unwrap()
        .work
        .push_back(DispatchTicket {
            queued_at: Instant::now(),
        });
}

fn trigger(kind: TriggerKind) -> PendingTrigger {
    PendingTrigger {
        payload: None,
        source: DEFAULT_SOURCE.to_string(),
        kind,
    }
}

fn held_record() -> Arc<EventRecord> {
    let record = EventRecord::detached("Remote", "Hold");
    record.set_started(false);
    assert_eq!(record.state(), RecordState::Held);
    record
}

#[test]
fn event_string_joins_prefix_and_suffix() {
    assert_eq!(event_string("Main", "A"), "Main.A");
    assert_eq!(event_string("Main", ""), "Main");
    assert_eq!(event_string("Serial", "Button.A"), "Serial.Button.A");
}

#[test]
fn request_defaults_to_main_prefix_and_builtin_source() {
    let request = EventRequest::new("Start");
    assert_eq!(request.prefix, DEFAULT_PREFIX);
    assert_eq!(request.source, DEFAULT_SOURCE);
    assert_eq!(request.payload, None);
    assert_eq!(request.string(), "Main.Start");
}

#[test]
fn resolve_reuses_the_live_record_and_queues_both_payload_and_source() {
    let registry = EventRegistry::new();
    let hooks = RecordHooks::default();

    let first = registry.resolve(request("A", 1, "x"), TriggerKind::Instant, &hooks);
    let second = registry.resolve(request("A", 2, "y"), TriggerKind::Instant, &hooks);
    let other = registry.resolve(request("B", 3, "x"), TriggerKind::Instant, &hooks);

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.strings(), vec!["Main.A", "Main.B"]);
    assert_eq!(
        first.pending_triggers(),
        vec![
            (Some(json!(1)), "x".to_string()),
            (Some(json!(2)), "y".to_string()),
        ]
    );
}

#[test]
fn next_work_is_fifo_and_retires_only_once_everything_drained() {
    let registry = EventRegistry::new();
    let hooks = RecordHooks::default();
    let record = registry.resolve(request("A", 1, "x"), TriggerKind::Instant, &hooks);
    registry.resolve(request("A", 2, "y"), TriggerKind::Instant, &hooks);

    push_ticket(&record);
    let first = registry.next_work(&record).expect("first trigger");
    assert_eq!(first.payload, Some(json!(1)));
    assert_eq!(record.state(), RecordState::Running);

    // The second trigger has not been executed yet, so the record must stay.
    assert!(registry.next_work(&record).is_none());
    assert!(!record.is_retired());
    assert!(registry.get("Main.A").is_some());

    push_ticket(&record);
    let second = registry.next_work(&record).expect("second trigger");
    assert_eq!(second.payload, Some(json!(2)));
    assert_eq!(second.source, "y");

    assert!(registry.next_work(&record).is_none());
    assert!(record.is_retired());
    assert!(registry.is_empty());

    let fresh = registry.resolve(request("A", 3, "z"), TriggerKind::Instant, &hooks);
    assert!(!Arc::ptr_eq(&fresh, &record));
}

#[test]
fn retired_record_does_not_evict_its_successor() {
    let registry = EventRegistry::new();
    let hooks = RecordHooks::default();
    let old = registry.resolve(request("A", 1, "x"), TriggerKind::Instant, &hooks);
    push_ticket(&old);
    registry.next_work(&old);
    assert!(registry.next_work(&old).is_none());

    let successor = registry.resolve(request("A", 2, "x"), TriggerKind::Instant, &hooks);
    assert!(registry.next_work(&old).is_none());
    assert!(Arc::ptr_eq(&registry.get("Main.A").unwrap(), &successor));
}

#[test]
fn up_funcs_fire_once_at_the_end_and_immediately_afterwards() {
    let record = held_record();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    record.add_up_func(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    record.set_should_end();
    assert!(record.is_ended());
    assert_eq!(record.state(), RecordState::Ended);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let counter = Arc::clone(&calls);
    record.add_up_func(move || {
        counter.fetch_add(10, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 11);

    record.set_should_end();
    assert_eq!(calls.load(Ordering::SeqCst), 11);
}

#[test]
fn concurrent_end_signals_fire_callbacks_exactly_once() {
    let record = held_record();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    record.add_up_func(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let record = Arc::clone(&record);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                record.set_should_end();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(record.is_ended());
}

#[test]
fn end_signal_during_a_dispatch_is_applied_when_it_finishes() {
    let registry = EventRegistry::new();
    let record = registry.resolve(EventRequest::new("Hold"), TriggerKind::Enduring, &RecordHooks::default());
    push_ticket(&record);
    let pending = registry.next_work(&record).expect("trigger");
    record.begin_dispatch(pending, 1);
    assert_eq!(record.state(), RecordState::Running);

    let ender = {
        let record = Arc::clone(&record);
        thread::spawn(move || record.set_should_end())
    };
    while !record.end_requested() {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(!record.is_ended());

    record.set_started(false);
    ender.join().unwrap();
    assert!(record.is_ended());
    assert!(!record.end_requested());
}

#[test]
fn enduring_dispatch_holds_until_ended() {
    let record = EventRecord::detached("Remote", "Up");
    record.begin_dispatch(trigger(TriggerKind::Enduring), 1);
    record.set_started(false);
    assert!(!record.is_ended());
    assert_eq!(record.state(), RecordState::Held);
    assert!(!record.wait_ended(Duration::from_millis(10)));

    record.set_should_end();
    assert!(record.wait_ended(Duration::from_millis(10)));
}

#[test]
fn new_dispatch_after_an_end_starts_a_fresh_lifecycle() {
    let record = EventRecord::detached("Remote", "Again");
    record.begin_dispatch(trigger(TriggerKind::Instant), 1);
    record.set_started(true);
    assert!(record.is_ended());

    let info = record.begin_dispatch(trigger(TriggerKind::Enduring), 2);
    assert_eq!(info.sequence, 2);
    assert!(!record.is_ended());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    record.add_up_func(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0, "callback waits for the new end");

    record.set_started(false);
    record.set_should_end();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn begin_dispatch_resets_transient_fields() {
    let record = EventRecord::detached("Main", "Reset");
    record.request_stop();
    record.set_percent(40.0);
    record.store_result(json!("old"));

    let info = record.begin_dispatch(
        PendingTrigger {
            payload: Some(json!({"k": 1})),
            source: "plugin".to_string(),
            kind: TriggerKind::Instant,
        },
        7,
    );

    assert!(!record.stop_requested());
    assert_eq!(record.percent_run(), 0.0);
    assert_eq!(record.last_result(), json!(null));
    assert_eq!(info.payload, Some(json!({"k": 1})));
    assert_eq!(record.payload(), Some(json!({"k": 1})));
    assert_eq!(record.info().source, "plugin");
}

#[test]
fn percent_is_clamped() {
    let record = EventRecord::detached("Main", "Meter");
    record.set_percent(140.0);
    assert_eq!(record.percent_run(), 100.0);
    record.set_percent(-3.0);
    assert_eq!(record.percent_run(), 0.0);
}

#[test]
fn panicking_up_func_does_not_block_the_rest() {
    let record = held_record();
    let calls = Arc::new(AtomicUsize::new(0));
    record.add_up_func(|| panic!("release handler failed"));
    let counter = Arc::clone(&calls);
    record.add_up_func(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    record.set_should_end();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(record.is_ended());
}

#[test]
fn release_before_the_dispatch_ends_the_event_once_it_finishes() {
    let registry = EventRegistry::new();
    let hooks = RecordHooks {
        end_timeout: Duration::from_secs(5),
        ..RecordHooks::default()
    };
    let record = registry.resolve(EventRequest::new("Up").prefix("Remote"), TriggerKind::Enduring, &hooks);
    assert_eq!(record.state(), RecordState::Idle);

    let releaser = {
        let record = Arc::clone(&record);
        thread::spawn(move || record.set_should_end())
    };
    while !record.end_requested() {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(!record.is_ended());

    push_ticket(&record);
    let pending = registry.next_work(&record).expect("press");
    record.begin_dispatch(pending, 1);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    record.add_up_func(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    record.set_started(false);
    releaser.join().unwrap();

    assert!(record.is_ended());
    assert_eq!(record.state(), RecordState::Ended);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn release_of_a_held_event_with_another_press_queued_waits_for_it() {
    let registry = EventRegistry::new();
    let hooks = RecordHooks {
        end_timeout: Duration::from_millis(10),
        ..RecordHooks::default()
    };
    let record = registry.resolve(EventRequest::new("Up"), TriggerKind::Enduring, &hooks);
    push_ticket(&record);
    let first = registry.next_work(&record).expect("first press");
    record.begin_dispatch(first, 1);
    record.set_started(false);
    assert_eq!(record.state(), RecordState::Held);

    registry.resolve(EventRequest::new("Up"), TriggerKind::Enduring, &hooks);
    record.set_should_end();
    assert!(!record.is_ended());
    assert!(record.end_requested());

    push_ticket(&record);
    let second = registry.next_work(&record).expect("second press");
    record.begin_dispatch(second, 2);
    record.set_started(false);
    assert!(record.is_ended());
}
