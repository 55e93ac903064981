use super::*;
use std::sync::Arc;

#[test]
fn guard_swaps_state_and_restores_it() {
    let machine = StateMachine::new();
    let data = Mutex::new(0u32);
    {
        let mut g = machine.lock(&data, Some(RenderState::Updating), "freshen");
        *g += 1;
        assert_eq!(machine.state(), RenderState::Updating);
        assert_eq!(machine.holder(), Some("freshen"));
    }
    assert_eq!(machine.state(), RenderState::Paused);
    assert_eq!(machine.holder(), None);
    assert_eq!(*data.lock(), 1);
}

#[test]
fn tag_only_guard_leaves_state_alone() {
    let machine = StateMachine::new();
    let data = Mutex::new(());
    let g = machine.lock(&data, None, "query");
    assert_eq!(machine.state(), RenderState::Paused);
    assert_eq!(g.tag(), "query");
    drop(g);
    assert!(machine.recent_transitions().is_empty());
}

#[test]
fn exiting_is_terminal() {
    let machine = StateMachine::new();
    let data = Mutex::new(());
    {
        let mut g = machine.lock(&data, Some(RenderState::Rendering), "render");
        assert!(g.set_state(RenderState::Exiting));
    }
    assert_eq!(machine.state(), RenderState::Exiting);
    assert!(!machine.transition(RenderState::Paused, "revive"));
    let _g = machine.lock(&data, Some(RenderState::Updating), "late");
    assert_eq!(machine.state(), RenderState::Exiting);
}

#[test]
fn set_state_keeps_the_original_restore_point() {
    let machine = StateMachine::new();
    let data = Mutex::new(());
    {
        let mut g = machine.lock(&data, Some(RenderState::Updating), "tiles");
        g.set_state(RenderState::Rendering);
        assert_eq!(machine.state(), RenderState::Rendering);
    }
    assert_eq!(machine.state(), RenderState::Paused);
}

#[test]
fn transitions_are_traced_with_bounded_history() {
    let machine = StateMachine::new();
    let data = Mutex::new(());
    for _ in 0..40 {
        let _g = machine.lock(&data, Some(RenderState::Rendering), "render");
    }
    let trace = machine.recent_transitions();
    assert_eq!(trace.len(), 32);
    let last = trace.last().unwrap();
    assert_eq!(
        (last.from, last.to, last.tag),
        (RenderState::Rendering, RenderState::Paused, "render")
    );
}

#[test]
fn timed_lock_names_the_holder() {
    let machine = Arc::new(StateMachine::new());
    let data = Arc::new(Mutex::new(()));
    let held = machine.lock(&data, Some(RenderState::Rendering), "long render");
    let err = machine
        .try_lock_for(
            &data,
            Some(RenderState::Updating),
            "freshen",
            Duration::from_millis(20),
        )
        .unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, RenderError::InvalidUsage(_)));
    assert!(msg.contains("long render"), "{msg}");
    assert_eq!(machine.state(), RenderState::Rendering);
    drop(held);

    let g = machine
        .try_lock_for(&data, None, "freshen", Duration::from_millis(20))
        .unwrap();
    assert_eq!(g.tag(), "freshen");
}

#[test]
fn timed_lock_acquires_once_the_holder_releases() {
    let machine = StateMachine::new();
    let data = Mutex::new(0u32);
    let held = machine.lock(&data, Some(RenderState::Rendering), "long render");
    std::thread::scope(|s| {
        let waiter = s.spawn(|| {
            machine
                .try_lock_for(
                    &data,
                    Some(RenderState::Updating),
                    "freshen",
                    Duration::from_secs(10),
                )
                .map(|g| g.tag().to_string())
        });
        std::thread::sleep(Duration::from_millis(20));
        drop(held);
        assert_eq!(waiter.join().unwrap().unwrap(), "freshen");
    });
    assert_eq!(machine.holder(), None);
}

#[test]
fn lock_serializes_threads() {
    let machine = Arc::new(StateMachine::new());
    let data = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let machine = Arc::clone(&machine);
            let data = Arc::clone(&data);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let mut g = machine.lock(&data, Some(RenderState::Updating), "worker");
                    assert_eq!(machine.state(), RenderState::Updating);
                    g.push(i);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(data.lock().len(), 200);
    assert_eq!(machine.state(), RenderState::Paused);
}
