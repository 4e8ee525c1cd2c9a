//! 资源请求者
//!
//! 在给定时刻发出 REQUEST（要求 GRANT 回复）并等待；拿到 GRANT 后占用 `hold` 个 tick，
//! 然后广播 RETURN 归还资源。

use std::any::Any;
use std::collections::BTreeSet;

use super::{GRANT, REQUEST, RETURN};
use crate::error::SimError;
use crate::node::{
    Behavior, Configuration, Cursor, EvaluatorNode, EvaluatorView, InitInfo, Node, Timeline,
};
use crate::sim::{Event, NodeId, SimTime};

#[derive(Debug, Clone)]
pub struct Requester {
    id: NodeId,
    timeline: Timeline,
    plan: Plan,
}

#[derive(Debug, Clone)]
struct Plan {
    at: BTreeSet<SimTime>,
    hold: i64,
    returns_due: Vec<SimTime>,
    granted_at: Vec<SimTime>,
    requested_at: Vec<SimTime>,
}

impl Requester {
    pub fn new(id: impl Into<NodeId>, at: impl IntoIterator<Item = i64>, hold: i64) -> Self {
        let id = id.into();
        Self {
            timeline: Timeline::new(id.clone()),
            id,
            plan: Plan {
                at: at.into_iter().map(SimTime).collect(),
                hold,
                returns_due: Vec::new(),
                granted_at: Vec::new(),
                requested_at: Vec::new(),
            },
        }
    }

    pub fn requested_at(&self) -> &[SimTime] {
        &self.plan.requested_at
    }

    pub fn granted_at(&self) -> &[SimTime] {
        &self.plan.granted_at
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}

impl Node for Requester {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn configuration(&self) -> Configuration {
        let at = self
            .plan
            .at
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",");
        Configuration::from([
            ("kind".to_string(), "requester".to_string()),
            ("at".to_string(), at),
            ("hold".to_string(), self.plan.hold.to_string()),
        ])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EvaluatorNode for Requester {
    fn initiate(&mut self, info: &InitInfo) -> Result<(), SimError> {
        if self.plan.hold <= 0 {
            return Err(SimError::node(&self.id, "hold must be positive"));
        }
        self.timeline = Timeline::new(self.id.clone()).with_history(info.history_len);
        for &t in &self.plan.at {
            self.timeline.schedule(t)?;
        }
        Ok(())
    }

    fn consume(&mut self, _window_end: SimTime, view: &mut EvaluatorView<'_>) -> Result<(), SimError> {
        let window = view.window();
        let batch = view.events();
        let pass = view.pass();
        self.timeline.advance(window, batch, pass, &mut self.plan, view)?;
        view.report_next_due(self.timeline.next_due());
        Ok(())
    }

    fn copy(&self) -> Box<dyn EvaluatorNode> {
        Box::new(self.clone())
    }
}

impl<'a> Behavior<EvaluatorView<'a>> for Plan {
    fn on_event(
        &mut self,
        event: Option<&Event>,
        cx: &mut Cursor<'_>,
        view: &mut EvaluatorView<'a>,
    ) -> Result<(), SimError> {
        let now = cx.now();
        match event {
            Some(ev) if ev.kind.as_str() == GRANT => {
                self.granted_at.push(now);
                let due = now.saturating_add(self.hold);
                self.returns_due.push(due);
                cx.wake_at(due)?;
            }
            Some(_) => {}
            None => {
                // 同一时刻的归还与新请求共用一次定时器
                let before = self.returns_due.len();
                self.returns_due.retain(|&t| t != now);
                for _ in self.returns_due.len()..before {
                    let ev = cx.event(RETURN);
                    view.raise_event(ev)?;
                }
                if self.at.contains(&now) {
                    self.requested_at.push(now);
                    let ev = cx.event(REQUEST).with_response_types([GRANT]);
                    view.raise_event(ev)?;
                    cx.wait_for_response();
                }
            }
        }
        Ok(())
    }
}
