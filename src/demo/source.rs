//! 周期性失效源
//!
//! 无依赖的 evaluator：运行 `up` 个 tick 后发出 FAIL，停机 `down` 个 tick 后发出 REPAIR，
//! 如此循环。只靠自己登记的回调推进。

use std::any::Any;

use super::{FAIL, REPAIR};
use crate::error::SimError;
use crate::node::{
    Behavior, Configuration, Cursor, EvaluatorNode, EvaluatorView, InitInfo, Node, Timeline,
};
use crate::sim::{Event, Magnitude, NodeId, SimTime};

#[derive(Debug, Clone)]
pub struct FailureSource {
    id: NodeId,
    timeline: Timeline,
    cycle: Cycle,
}

#[derive(Debug, Clone)]
struct Cycle {
    up: i64,
    down: i64,
    offset: i64,
    failed: bool,
    failures: u64,
}

impl FailureSource {
    pub fn new(id: impl Into<NodeId>, up: i64, down: i64) -> Self {
        let id = id.into();
        Self {
            timeline: Timeline::new(id.clone()),
            id,
            cycle: Cycle {
                up,
                down,
                offset: 0,
                failed: false,
                failures: 0,
            },
        }
    }

    /// 第一次失效推迟 `offset` 个 tick
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.cycle.offset = offset;
        self
    }

    pub fn failures(&self) -> u64 {
        self.cycle.failures
    }

    pub fn is_failed(&self) -> bool {
        self.cycle.failed
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}

impl Node for FailureSource {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn configuration(&self) -> Configuration {
        Configuration::from([
            ("kind".to_string(), "failure_source".to_string()),
            ("up".to_string(), self.cycle.up.to_string()),
            ("down".to_string(), self.cycle.down.to_string()),
            ("offset".to_string(), self.cycle.offset.to_string()),
        ])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EvaluatorNode for FailureSource {
    fn initiate(&mut self, info: &InitInfo) -> Result<(), SimError> {
        if self.cycle.up <= 0 || self.cycle.down <= 0 || self.cycle.offset < 0 {
            return Err(SimError::node(
                &self.id,
                "up/down must be positive and offset non-negative",
            ));
        }
        self.timeline = Timeline::new(self.id.clone()).with_history(info.history_len);
        let first = SimTime(self.cycle.offset.saturating_add(self.cycle.up));
        self.timeline.schedule(first)?;
        Ok(())
    }

    fn consume(&mut self, _window_end: SimTime, view: &mut EvaluatorView<'_>) -> Result<(), SimError> {
        let window = view.window();
        let batch = view.events();
        let pass = view.pass();
        self.timeline.advance(window, batch, pass, &mut self.cycle, view)?;
        view.report_next_due(self.timeline.next_due());
        Ok(())
    }

    fn copy(&self) -> Box<dyn EvaluatorNode> {
        Box::new(self.clone())
    }
}

impl<'a> Behavior<EvaluatorView<'a>> for Cycle {
    fn on_event(
        &mut self,
        event: Option<&Event>,
        cx: &mut Cursor<'_>,
        view: &mut EvaluatorView<'a>,
    ) -> Result<(), SimError> {
        // 根节点没有上游，只响应定时器
        if event.is_some() {
            return Ok(());
        }
        let ev = if self.failed {
            self.failed = false;
            cx.wake_after(self.up)?;
            cx.event(REPAIR)
        } else {
            self.failed = true;
            self.failures += 1;
            cx.wake_after(self.down)?;
            cx.event(FAIL).with_magnitude(Magnitude::new(self.down as f64, "ticks"))
        };
        view.raise_event(ev)?;
        Ok(())
    }
}
