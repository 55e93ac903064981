use super::*;
use std::sync::Mutex;

#[test]
fn percent_handles_empty_and_overshoot() {
    let mut ev = ProgressEvent {
        phase: ProgressPhase::ObjectSyncComplete,
        current_index: 1,
        total_count: 4,
        elapsed_ms: 0,
        object_name: None,
    };
    assert_eq!(ev.percent(), 25);
    ev.current_index = 9;
    assert_eq!(ev.percent(), 100);
    ev.total_count = 0;
    assert_eq!(ev.percent(), 100);
}

#[test]
fn events_reach_the_callback_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let reporter = ProgressReporter::new(Some(Arc::new(move |e: &ProgressEvent| {
        sink.lock().unwrap().push((e.phase, e.object_name.clone()));
    })));
    reporter.emit(ProgressPhase::SyncStarted, 0, 1, None);
    reporter.emit(ProgressPhase::ObjectPreSync, 0, 1, Some("ball"));
    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (ProgressPhase::SyncStarted, None),
            (ProgressPhase::ObjectPreSync, Some("ball".to_string())),
        ]
    );
}

#[test]
fn reporter_without_callback_is_silent() {
    let reporter = ProgressReporter::default();
    reporter.emit(ProgressPhase::RenderStart, 0, 0, None);
}
