use std::any::Any;

use crate::demo::{Requester, ResourcePool};
use crate::engine::{Engine, GraphBuilder};
use crate::error::{FailureCause, ProtocolViolation, SimError, UsageError};
use crate::node::{EvaluatorNode, EvaluatorView, Node, ResponderNode, ResponderView};
use crate::sim::{Event, EventType, NodeId, SimTime};

fn id(s: &str) -> NodeId {
    NodeId::new(s)
}

fn pool_graph(capacity: u32, hold: i64) -> Engine {
    let mut g = GraphBuilder::new();
    g.add_evaluator(Box::new(Requester::new("p1", [5], hold)))
        .expect("p1");
    g.add_evaluator(Box::new(Requester::new("p2", [5], hold)))
        .expect("p2");
    g.add_responder(Box::new(ResourcePool::new("pool", capacity)))
        .expect("pool");
    g.subscribe(&id("p1"), &id("pool")).expect("p1 -> pool");
    g.subscribe(&id("p2"), &id("pool")).expect("p2 -> pool");
    g.build().expect("build")
}

#[test]
fn pool_grants_in_arrival_order_and_requeues_on_return() {
    let mut engine = pool_graph(1, 3);
    engine.evaluate(SimTime(20)).expect("evaluate");

    let grants = engine
        .with_node(&id("pool"), |p: &ResourcePool| p.grants().to_vec())
        .expect("pool");
    assert_eq!(
        grants,
        vec![(id("p1"), SimTime(5)), (id("p2"), SimTime(8))]
    );
    assert_eq!(
        engine.with_node(&id("pool"), |p: &ResourcePool| (p.in_use(), p.waiting(), p.max_waiting())),
        Some((0, 0, 1))
    );
    assert_eq!(
        engine.with_node(&id("p2"), |r: &Requester| r.granted_at().to_vec()),
        Some(vec![SimTime(8)])
    );
    assert_eq!(
        engine.with_node(&id("p1"), |r: &Requester| r.timeline().processed()),
        Some(SimTime(20))
    );
}

#[test]
fn pool_with_spare_capacity_grants_immediately() {
    let mut engine = pool_graph(2, 3);
    engine.evaluate(SimTime(10)).expect("evaluate");
    let grants = engine
        .with_node(&id("pool"), |p: &ResourcePool| p.grants().to_vec())
        .expect("pool");
    assert_eq!(
        grants,
        vec![(id("p1"), SimTime(5)), (id("p2"), SimTime(5))]
    );
}

fn grants(engine: &Engine) -> Vec<(NodeId, SimTime)> {
    engine
        .with_node(&id("pool"), |p: &ResourcePool| p.grants().to_vec())
        .expect("pool")
}

#[test]
fn wait_spanning_a_window_boundary_is_granted_next_window() {
    let mut g = GraphBuilder::new();
    g.add_evaluator(Box::new(Requester::new("p1", [95], 10)))
        .expect("p1");
    g.add_evaluator(Box::new(Requester::new("p2", [96], 10)))
        .expect("p2");
    g.add_responder(Box::new(ResourcePool::new("pool", 1)))
        .expect("pool");
    g.subscribe(&id("p1"), &id("pool")).expect("p1 -> pool");
    g.subscribe(&id("p2"), &id("pool")).expect("p2 -> pool");
    let mut engine = g.build().expect("build");

    engine.evaluate(SimTime(100)).expect("first window commits");
    assert_eq!(engine.clock(), SimTime(100));
    assert_eq!(grants(&engine), vec![(id("p1"), SimTime(95))]);
    assert_eq!(
        engine.with_node(&id("p2"), |r: &Requester| {
            (r.timeline().processed(), r.timeline().is_suspended(), r.granted_at().len())
        }),
        Some((SimTime(96), true, 0))
    );

    engine.evaluate(SimTime(200)).expect("second window commits");
    assert_eq!(
        grants(&engine),
        vec![(id("p1"), SimTime(95)), (id("p2"), SimTime(105))]
    );
    assert_eq!(
        engine.with_node(&id("p2"), |r: &Requester| r.granted_at().to_vec()),
        Some(vec![SimTime(105)])
    );
    assert_eq!(
        engine.with_node(&id("pool"), |p: &ResourcePool| (p.in_use(), p.waiting())),
        Some((0, 0))
    );
    assert_eq!(
        engine.with_node(&id("p2"), |r: &Requester| r.timeline().processed()),
        Some(SimTime(200))
    );
}

#[test]
fn downstream_request_earlier_than_upstream_is_served_first() {
    let mut g = GraphBuilder::new();
    g.add_evaluator(Box::new(Requester::new("p1", [50], 10)))
        .expect("p1");
    g.add_evaluator(Box::new(Requester::new("p2", [10], 10)))
        .expect("p2");
    g.add_responder(Box::new(ResourcePool::new("pool", 5)))
        .expect("pool");
    g.subscribe(&id("p1"), &id("p2")).expect("p1 -> p2");
    g.subscribe(&id("p1"), &id("pool")).expect("p1 -> pool");
    g.subscribe(&id("p2"), &id("pool")).expect("p2 -> pool");
    let mut engine = g.build().expect("build");

    engine.evaluate(SimTime(100)).expect("evaluate");
    assert_eq!(
        grants(&engine),
        vec![(id("p2"), SimTime(10)), (id("p1"), SimTime(50))]
    );
    assert_eq!(
        engine.with_node(&id("p2"), |r: &Requester| r.granted_at().to_vec()),
        Some(vec![SimTime(10)])
    );
    assert_eq!(
        engine.with_node(&id("pool"), |p: &ResourcePool| p.in_use()),
        Some(0)
    );
    assert!(!engine.is_dead());
}

#[derive(Clone)]
struct Pinger {
    id: NodeId,
    sent: bool,
    got: Vec<String>,
}

impl Pinger {
    fn new(name: &str) -> Self {
        Self {
            id: id(name),
            sent: false,
            got: Vec::new(),
        }
    }
}

impl Node for Pinger {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EvaluatorNode for Pinger {
    fn consume(&mut self, _window_end: SimTime, view: &mut EvaluatorView<'_>) -> Result<(), SimError> {
        for e in view.events() {
            self.got.push(e.kind.to_string());
        }
        if !self.sent {
            self.sent = true;
            let ping = Event::new(self.id.clone(), EventType::new("PING"), SimTime(1), 0)
                .with_response_types(["ACK"]);
            view.raise_event(ping)?;
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn EvaluatorNode> {
        Box::new(self.clone())
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Once,
    Twice,
    WrongType,
    Fabricate,
}

#[derive(Clone)]
struct Echo {
    id: NodeId,
    mode: Mode,
    next: u64,
}

impl Node for Echo {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Echo {
    fn reply(&mut self, kind: &str, time: SimTime) -> Event {
        let ev = Event::new(self.id.clone(), EventType::new(kind), time, self.next);
        self.next += 1;
        ev
    }
}

impl ResponderNode for Echo {
    fn consume(&mut self, _window_end: SimTime, view: &mut ResponderView<'_>) -> Result<(), SimError> {
        for req in view.events() {
            if req.kind.as_str() != "PING" {
                continue;
            }
            match self.mode {
                Mode::Once => {
                    let ack = self.reply("ACK", req.time);
                    view.raise_response(ack, req)?;
                }
                Mode::Twice => {
                    let ack = self.reply("ACK", req.time);
                    view.raise_response(ack, req)?;
                    let again = self.reply("ACK", req.time);
                    view.raise_response(again, req)?;
                }
                Mode::WrongType => {
                    let nak = self.reply("NAK", req.time);
                    view.raise_response(nak, req)?;
                }
                Mode::Fabricate => {
                    let fake = Event::new(req.producer.clone(), req.kind.clone(), req.time, 99)
                        .with_response_types(["ACK"]);
                    let ack = self.reply("ACK", req.time);
                    view.raise_response(ack, &fake)?;
                }
            }
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn ResponderNode> {
        Box::new(self.clone())
    }
}

fn ping_graph(mode: Mode) -> Engine {
    let mut g = GraphBuilder::new();
    g.add_evaluator(Box::new(Pinger::new("pinger")))
        .expect("pinger");
    g.add_responder(Box::new(Echo {
        id: id("echo"),
        mode,
        next: 0,
    }))
    .expect("echo");
    g.subscribe(&id("pinger"), &id("echo")).expect("subscribe");
    g.build().expect("build")
}

fn single_failure(err: SimError) -> (NodeId, FailureCause) {
    match err {
        SimError::TaskFailures(mut failures) => {
            assert_eq!(failures.len(), 1, "expected exactly one failure: {failures:?}");
            let f = failures.remove(0);
            (f.node, f.cause)
        }
        other => panic!("expected task failures, got {other:?}"),
    }
}

#[test]
fn reply_is_routed_back_and_reenqueues_requester() {
    let mut engine = ping_graph(Mode::Once);
    engine.evaluate(SimTime(10)).expect("evaluate");
    assert_eq!(
        engine.with_node(&id("pinger"), |p: &Pinger| p.got.clone()),
        Some(vec!["ACK".to_string()])
    );
}

#[test]
fn second_reply_to_the_same_request_is_unmatched() {
    let mut engine = ping_graph(Mode::Twice);
    let err = engine.evaluate(SimTime(10)).expect_err("unmatched");
    let (node, cause) = single_failure(err);
    assert_eq!(node, id("echo"));
    assert!(matches!(
        cause,
        FailureCause::Error(SimError::Protocol(ProtocolViolation::UnmatchedResponse { .. }))
    ));
    assert!(engine.is_dead());
}

#[test]
fn reply_type_must_be_permitted_by_request() {
    let mut engine = ping_graph(Mode::WrongType);
    let err = engine.evaluate(SimTime(10)).expect_err("wrong type");
    let (node, cause) = single_failure(err);
    assert_eq!(node, id("echo"));
    assert_eq!(
        cause,
        FailureCause::Error(SimError::Usage(UsageError::ReplyTypeNotPermitted {
            producer: id("pinger"),
            request: EventType::new("PING"),
            reply: EventType::new("NAK"),
        }))
    );
}

#[test]
fn reply_to_a_request_not_yet_raised_is_detected() {
    let mut engine = ping_graph(Mode::Fabricate);
    let err = engine.evaluate(SimTime(10)).expect_err("premature");
    let (_, cause) = single_failure(err);
    assert!(matches!(
        cause,
        FailureCause::Error(SimError::Protocol(
            ProtocolViolation::ResponseBeforeRequest { ordinal: 99, .. }
        ))
    ));
}
