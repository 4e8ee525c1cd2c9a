//! 或门风险传播
//!
//! 任一上游处于失效状态时本节点失效：0→1 时广播 FAIL，1→0 时广播 REPAIR，
//! 输出事件记录触发它的输入作为因果父事件。

use std::any::Any;
use std::collections::BTreeSet;

use super::{FAIL, REPAIR};
use crate::error::SimError;
use crate::node::{
    Behavior, Configuration, Cursor, EvaluatorNode, EvaluatorView, EventFilter, InitInfo, Node,
    Timeline,
};
use crate::sim::{Event, EventOrdering, NodeId, SimTime, TypeOrder};

#[derive(Debug, Clone)]
pub struct AnyGate {
    id: NodeId,
    timeline: Timeline,
    state: GateState,
}

#[derive(Debug, Clone, Default)]
struct GateState {
    down: BTreeSet<NodeId>,
    trips: u64,
}

fn gate_order() -> TypeOrder {
    // 同一时刻先失效后修复，避免一次交接产生抖动
    TypeOrder::ranked([FAIL, REPAIR])
}

impl AnyGate {
    pub fn new(id: impl Into<NodeId>) -> Self {
        let id = id.into();
        Self {
            timeline: Timeline::with_ordering(id.clone(), EventOrdering::with_type_order(gate_order())),
            id,
            state: GateState::default(),
        }
    }

    pub fn is_failed(&self) -> bool {
        !self.state.down.is_empty()
    }

    /// 输出 FAIL 的次数
    pub fn trips(&self) -> u64 {
        self.state.trips
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}

impl Node for AnyGate {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn accepts(&self) -> EventFilter {
        EventFilter::types([FAIL, REPAIR])
    }

    fn type_order(&self) -> Option<TypeOrder> {
        Some(gate_order())
    }

    fn configuration(&self) -> Configuration {
        Configuration::from([("kind".to_string(), "any_gate".to_string())])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EvaluatorNode for AnyGate {
    fn initiate(&mut self, info: &InitInfo) -> Result<(), SimError> {
        if info.dependencies.is_empty() {
            return Err(SimError::node(&self.id, "any_gate needs at least one input"));
        }
        self.timeline = Timeline::with_ordering(
            self.id.clone(),
            EventOrdering::with_type_order(gate_order()),
        )
        .with_history(info.history_len);
        Ok(())
    }

    fn consume(&mut self, _window_end: SimTime, view: &mut EvaluatorView<'_>) -> Result<(), SimError> {
        let window = view.window();
        let batch = view.events();
        let pass = view.pass();
        self.timeline.advance(window, batch, pass, &mut self.state, view)?;
        view.report_next_due(self.timeline.next_due());
        Ok(())
    }

    fn copy(&self) -> Box<dyn EvaluatorNode> {
        Box::new(self.clone())
    }
}

impl<'a> Behavior<EvaluatorView<'a>> for GateState {
    fn on_event(
        &mut self,
        event: Option<&Event>,
        cx: &mut Cursor<'_>,
        view: &mut EvaluatorView<'a>,
    ) -> Result<(), SimError> {
        let Some(ev) = event else {
            return Ok(());
        };
        let was_down = !self.down.is_empty();
        match ev.kind.as_str() {
            FAIL => {
                self.down.insert(ev.producer.clone());
            }
            REPAIR => {
                self.down.remove(&ev.producer);
            }
            _ => return Ok(()),
        }
        let is_down = !self.down.is_empty();
        if was_down == is_down {
            return Ok(());
        }
        let out = if is_down {
            self.trips += 1;
            cx.event(FAIL).caused_by(ev)
        } else {
            cx.event(REPAIR).caused_by(ev)
        };
        view.raise_event(out)?;
        Ok(())
    }
}
