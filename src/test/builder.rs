use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::demo::{AnyGate, Counter, FailureSource, ResourcePool};
use crate::engine::{EntryKind, GraphBuilder};
use crate::error::{SimError, UsageError};
use crate::node::{EvaluatorNode, EvaluatorView, InitInfo, Node};
use crate::sim::{NodeId, SimTime};

#[derive(Clone)]
struct InitSpy {
    id: NodeId,
    seen: Arc<Mutex<Option<InitInfo>>>,
}

impl Node for InitSpy {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EvaluatorNode for InitSpy {
    fn initiate(&mut self, info: &InitInfo) -> Result<(), SimError> {
        *self.seen.lock().expect("spy lock") = Some(info.clone());
        Ok(())
    }

    fn consume(&mut self, _window_end: SimTime, _view: &mut EvaluatorView<'_>) -> Result<(), SimError> {
        Ok(())
    }

    fn copy(&self) -> Box<dyn EvaluatorNode> {
        Box::new(self.clone())
    }
}

#[test]
fn malformed_and_duplicate_ids_are_rejected() {
    let mut g = GraphBuilder::new();
    assert_eq!(
        g.add_sink(Box::new(Counter::new(""))),
        Err(UsageError::MalformedId(String::new()))
    );
    assert_eq!(
        g.add_sink(Box::new(Counter::new("has space"))),
        Err(UsageError::MalformedId("has space".to_string()))
    );

    g.add_sink(Box::new(Counter::new("sink"))).expect("first");
    assert_eq!(
        g.add_sink(Box::new(Counter::new("sink"))),
        Err(UsageError::DuplicateId(NodeId::new("sink")))
    );
    assert_eq!(g.len(), 1);
}

#[test]
fn subscribe_validates_ids_and_roles() {
    let mut g = GraphBuilder::new();
    let src = g
        .add_evaluator(Box::new(FailureSource::new("src", 5, 1)))
        .expect("src");
    let pool = g
        .add_responder(Box::new(ResourcePool::new("pool", 1)))
        .expect("pool");
    let sink = g.add_sink(Box::new(Counter::new("sink"))).expect("sink");
    let ghost = NodeId::new("ghost");

    assert_eq!(
        g.subscribe(&ghost, &sink),
        Err(UsageError::UnknownId(ghost.clone()))
    );
    assert_eq!(
        g.subscribe(&src, &ghost),
        Err(UsageError::UnknownId(ghost.clone()))
    );
    assert_eq!(
        g.subscribe(&src, &src),
        Err(UsageError::SelfSubscription(src.clone()))
    );
    assert_eq!(
        g.subscribe(&pool, &sink),
        Err(UsageError::RoleMismatch {
            node: pool.clone(),
            expected: "evaluator",
            actual: "responder",
        })
    );
    assert_eq!(
        g.subscribe(&sink, &src),
        Err(UsageError::RoleMismatch {
            node: sink.clone(),
            expected: "evaluator",
            actual: "sink",
        })
    );

    g.subscribe(&src, &sink).expect("subscribe");
    g.subscribe(&src, &sink).expect("duplicate subscribe is ignored");

    let engine = g.build().expect("build");
    assert_eq!(engine.dependencies(&sink), Ok(vec![src.clone()]));
    assert_eq!(engine.subscribers(&src), Ok(vec![sink.clone()]));
    assert_eq!(engine.kind(&pool), Ok(EntryKind::Responder));
    assert_eq!(
        engine.kind(&ghost),
        Err(UsageError::UnknownId(ghost.clone()))
    );
}

#[test]
fn build_passes_topology_to_initiate() {
    let seen = Arc::new(Mutex::new(None));
    let mut g = GraphBuilder::new();
    let src = g
        .add_evaluator(Box::new(FailureSource::new("src", 5, 1)))
        .expect("src");
    let spy = g
        .add_evaluator(Box::new(InitSpy {
            id: NodeId::new("spy"),
            seen: Arc::clone(&seen),
        }))
        .expect("spy");
    let sink = g.add_sink(Box::new(Counter::new("sink"))).expect("sink");
    g.subscribe(&src, &spy).expect("src -> spy");
    g.subscribe(&spy, &sink).expect("spy -> sink");

    let _engine = g.build().expect("build");
    let info = seen.lock().expect("spy lock").clone().expect("initiate called");
    assert_eq!(info.id, spy);
    assert_eq!(info.dependencies, vec![src]);
    assert_eq!(info.subscribers, vec![sink]);
    assert_eq!(info.history_len, crate::node::runtime::DEFAULT_HISTORY_LEN);
}

#[test]
fn initiate_failure_aborts_build() {
    let mut g = GraphBuilder::new();
    g.add_evaluator(Box::new(FailureSource::new("bad", 0, 1)))
        .expect("register");
    let err = g.build().err().expect("build must fail");
    assert!(matches!(err, SimError::Node { ref node, .. } if node.as_str() == "bad"));
    assert!(err.is_fatal());

    let mut g = GraphBuilder::new();
    g.add_evaluator(Box::new(AnyGate::new("lonely")))
        .expect("register");
    assert!(matches!(g.build(), Err(SimError::Node { .. })));
}

#[test]
fn usage_errors_are_not_fatal() {
    let err = SimError::from(UsageError::UnknownId(NodeId::new("x")));
    assert!(!err.is_fatal());
    assert!(SimError::Dead.is_fatal());
}
