use std::sync::{Arc, Mutex};

use crate::demo::{Requester, ResourcePool};
use crate::engine::{GraphBuilder, Observed, Observer, TraceRecorder};
use crate::error::{FailureCause, SimError};
use crate::sim::{NodeId, SimTime, Window};

fn id(s: &str) -> NodeId {
    NodeId::new(s)
}

fn pool_builder() -> GraphBuilder {
    let mut g = GraphBuilder::new();
    g.add_evaluator(Box::new(Requester::new("p1", [5], 3)))
        .expect("p1");
    g.add_evaluator(Box::new(Requester::new("p2", [5], 3)))
        .expect("p2");
    g.add_responder(Box::new(ResourcePool::new("pool", 1)))
        .expect("pool");
    g.subscribe(&id("p1"), &id("pool")).expect("p1 -> pool");
    g.subscribe(&id("p2"), &id("pool")).expect("p2 -> pool");
    g
}

struct WindowLog {
    log: Arc<Mutex<Vec<(Window, usize)>>>,
}

impl Observer for WindowLog {
    fn observe(&mut self, window: Window, snapshot: &[Observed]) -> Result<(), SimError> {
        self.log
            .lock()
            .expect("log lock")
            .push((window, snapshot.len()));
        Ok(())
    }
}

#[test]
fn trace_recorder_sees_canonically_ordered_events_and_responses() {
    let recorder = TraceRecorder::new();
    let mut g = pool_builder();
    g.add_observer(Box::new(recorder.clone()));
    let mut engine = g.build().expect("build");
    engine.evaluate(SimTime(20)).expect("evaluate");

    let got: Vec<(i64, String, String, bool)> = recorder
        .records()
        .into_iter()
        .map(|r| (r.time, r.producer, r.kind, r.in_response_to.is_some()))
        .collect();
    assert_eq!(
        got,
        vec![
            (5, "p1".to_string(), "REQUEST".to_string(), false),
            (5, "p2".to_string(), "REQUEST".to_string(), false),
            (5, "pool".to_string(), "GRANT".to_string(), true),
            (8, "p1".to_string(), "RETURN".to_string(), false),
            (8, "pool".to_string(), "GRANT".to_string(), true),
            (11, "p2".to_string(), "RETURN".to_string(), false),
        ]
    );

    let records = recorder.records();
    assert!(records.iter().all(|r| r.window_end == 20));
    let second_grant = records
        .iter()
        .filter(|r| r.kind == "GRANT")
        .nth(1)
        .and_then(|r| r.in_response_to.clone())
        .expect("second grant");
    assert_eq!(second_grant.producer, "p2");
    assert_eq!(second_grant.ordinal, 0);

    let json = recorder.to_json().expect("serialize trace");
    let v: serde_json::Value = serde_json::from_str(&json).expect("parse trace");
    let arr = v.as_array().expect("trace is an array");
    assert_eq!(arr.len(), 6);
    assert_eq!(arr[0].get("type").and_then(|t| t.as_str()), Some("REQUEST"));
}

#[test]
fn observers_get_one_snapshot_per_window() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut g = pool_builder();
    g.add_observer(Box::new(WindowLog {
        log: Arc::clone(&log),
    }));
    let mut engine = g.build().expect("build");
    engine.evaluate(SimTime(20)).expect("first");
    engine.evaluate(SimTime(30)).expect("second");

    let log = log.lock().expect("log lock").clone();
    assert_eq!(
        log,
        vec![
            (Window::new(SimTime(0), SimTime(20)), 6),
            (Window::new(SimTime(20), SimTime(30)), 0),
        ]
    );
}

struct Rejecting;

impl Observer for Rejecting {
    fn observe(&mut self, _window: Window, _snapshot: &[Observed]) -> Result<(), SimError> {
        Err(SimError::node(&NodeId::new("observer"), "cannot store"))
    }
}

#[test]
fn observer_failure_is_fatal() {
    let mut g = pool_builder();
    g.add_observer(Box::new(Rejecting));
    let mut engine = g.build().expect("build");
    let err = engine.evaluate(SimTime(20)).expect_err("observer error");
    match err {
        SimError::TaskFailures(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].node.as_str(), "observer#0");
            assert!(matches!(failures[0].cause, FailureCause::Error(SimError::Node { .. })));
        }
        other => panic!("expected task failures, got {other:?}"),
    }
    assert!(engine.is_dead());
    assert_eq!(engine.clock(), SimTime::ZERO);
}
