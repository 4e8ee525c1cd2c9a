//! 窗口视图
//!
//! 内核每次调用节点时传入的、按角色裁剪的资源视图。视图只在单次调用内有效，
//! 节点不得保留。`ResponderView` 与 `EvaluatorView` 通过 `Deref` 逐层暴露
//! 更基础角色的能力。

use std::ops::{Deref, DerefMut};

use super::runtime::Pass;
use crate::error::UsageError;
use crate::sim::{Event, NodeId, SimTime, Window};

/// 一次回复：回复事件 + 它所回应的原始请求
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePair {
    pub reply: Event,
    pub request: Event,
}

/// 单次调用中节点产生的全部输出，以及用于校验的单调性水位
#[derive(Debug)]
pub(crate) struct Outbox {
    node: NodeId,
    window: Window,
    last_time: SimTime,
    next_ordinal: u64,
    floor: SimTime,
    pub(crate) events: Vec<Event>,
    pub(crate) responses: Vec<ResponsePair>,
    pub(crate) awaiting: Vec<Event>,
    pub(crate) keep_active: bool,
    /// 外层 `None`：本次调用没有报告
    pub(crate) next_due: Option<Option<SimTime>>,
}

impl Outbox {
    /// `floor` 是本条目已向下游承诺的最早产出时刻
    pub(crate) fn new(
        node: NodeId,
        window: Window,
        last_time: SimTime,
        next_ordinal: u64,
        floor: SimTime,
    ) -> Self {
        Self {
            node,
            window,
            last_time,
            next_ordinal,
            floor,
            events: Vec::new(),
            responses: Vec::new(),
            awaiting: Vec::new(),
            keep_active: false,
            next_due: None,
        }
    }

    pub(crate) fn last_time(&self) -> SimTime {
        self.last_time
    }

    pub(crate) fn next_ordinal(&self) -> u64 {
        self.next_ordinal
    }

    fn admit(&mut self, ev: &Event) -> Result<(), UsageError> {
        if ev.producer != self.node {
            return Err(UsageError::WrongProducer {
                node: self.node.clone(),
                producer: ev.producer.clone(),
            });
        }
        if !self.window.contains(ev.time) {
            return Err(UsageError::OutsideWindow {
                time: ev.time,
                start: self.window.start,
                end: self.window.end,
            });
        }
        if ev.time < self.last_time {
            return Err(UsageError::NonMonotonicTime {
                node: self.node.clone(),
                time: ev.time,
                last: self.last_time,
            });
        }
        if ev.time < self.floor {
            return Err(UsageError::BeforePromise {
                node: self.node.clone(),
                time: ev.time,
                floor: self.floor,
            });
        }
        if ev.ordinal < self.next_ordinal {
            return Err(UsageError::NonMonotonicOrdinal {
                node: self.node.clone(),
                ordinal: ev.ordinal,
            });
        }
        self.last_time = ev.time;
        self.next_ordinal = ev.ordinal.saturating_add(1);
        if ev.demands_reply() {
            self.awaiting.push(ev.clone());
        }
        Ok(())
    }
}

/// Sink 视图：只读的入站事件
#[derive(Debug)]
pub struct SinkView<'a> {
    window: Window,
    inbound: &'a [Event],
    pass: Pass,
}

impl<'a> SinkView<'a> {
    pub(crate) fn new(window: Window, inbound: &'a [Event], pass: Pass) -> Self {
        Self {
            window,
            inbound,
            pass,
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn window_end(&self) -> SimTime {
        self.window.end
    }

    /// 本次调用的入站事件（规范顺序）
    pub fn events(&self) -> &'a [Event] {
        self.inbound
    }

    /// 所有上游依赖本窗口是否都已完成；为 false 时本次调用只是部分推进
    pub fn dependencies_complete(&self) -> bool {
        self.pass.is_final()
    }

    /// 直接交给 `Timeline::advance` 的推进约束
    pub fn pass(&self) -> Pass {
        self.pass
    }
}

/// Responder 视图：可以回复请求、保持活跃
#[derive(Debug)]
pub struct ResponderView<'a> {
    base: SinkView<'a>,
    out: &'a mut Outbox,
}

impl<'a> ResponderView<'a> {
    pub(crate) fn new(base: SinkView<'a>, out: &'a mut Outbox) -> Self {
        Self { base, out }
    }

    /// 回复 `in_response_to`；回复会点对点送回请求的生产者
    pub fn raise_response(&mut self, reply: Event, in_response_to: &Event) -> Result<(), UsageError> {
        if !in_response_to.permits_reply(&reply.kind) {
            return Err(UsageError::ReplyTypeNotPermitted {
                producer: in_response_to.producer.clone(),
                request: in_response_to.kind.clone(),
                reply: reply.kind,
            });
        }
        self.out.admit(&reply)?;
        self.out.responses.push(ResponsePair {
            reply,
            request: in_response_to.clone(),
        });
        Ok(())
    }

    /// 之后任何被接受的入站事件都会把本条目标记为活跃
    pub fn keep_active(&mut self) {
        self.out.keep_active = true;
    }

    /// 报告内部最早的待办时刻（`None` 表示只会被新输入唤醒）。
    ///
    /// 内核据此计算本条目向下游承诺的最早产出时刻；不报告时按已推进到的时刻
    /// 保守估计，部分推进会多走几轮。
    pub fn report_next_due(&mut self, next: Option<SimTime>) {
        self.out.next_due = Some(next);
    }
}

impl<'a> Deref for ResponderView<'a> {
    type Target = SinkView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

/// Evaluator 视图：可以向订阅者广播事件
#[derive(Debug)]
pub struct EvaluatorView<'a> {
    inner: ResponderView<'a>,
}

impl<'a> EvaluatorView<'a> {
    pub(crate) fn new(inner: ResponderView<'a>) -> Self {
        Self { inner }
    }

    pub fn raise_event(&mut self, ev: Event) -> Result<(), UsageError> {
        self.inner.out.admit(&ev)?;
        self.inner.out.events.push(ev);
        Ok(())
    }
}

impl<'a> Deref for EvaluatorView<'a> {
    type Target = ResponderView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a> DerefMut for EvaluatorView<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
