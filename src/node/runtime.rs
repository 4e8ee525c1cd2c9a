//! 节点运行时循环
//!
//! 每个节点内嵌一个 `Timeline`，把自己的仿真时钟推进到窗口边界。推进时合并三路
//! 有序来源：本次新到的入站事件、上次延后的事件、以及节点自己登记的回调时间。
//!
//! - 事件时间早于下一个回调：处理事件
//! - 二者相等：静默消费该回调，只处理一次事件
//! - 回调更早（或没有事件）：消费回调，以“无事件”调用一次（定时器触发）
//!
//! 处理过程中节点可以要求“等待回复”：首次出现时冻结 cutoff，之后晚于 cutoff
//! 的事件被延后；cutoff 之前没有工作后提前退出，时钟停在边界之前，且不触发
//! 窗口结束钩子。干净退出时触发结束钩子并把时钟锁定到边界。
//!
//! 依赖尚未完成时内核给出的是部分推进（`Reach::Until`），只处理不晚于上游承诺
//! 时刻的工作。仍在等待回复的推进（`Pass::awaiting`）沿用上次冻结的 cutoff，
//! 等待可以跨越窗口边界。

use std::collections::VecDeque;

use crate::error::{ProtocolViolation, SimError, UsageError};
use crate::queue::{EventHeap, TimeHeap};
use crate::sim::{Event, EventOrdering, EventType, NodeId, SimTime, Window};
use tracing::trace;

pub const DEFAULT_HISTORY_LEN: usize = 32;

/// 节点行为：运行时循环在合适的时机回调这些钩子
pub trait Behavior<V: ?Sized> {
    fn on_window_start(&mut self, _cx: &mut Cursor<'_>, _view: &mut V) -> Result<(), SimError> {
        Ok(())
    }

    /// `event` 为 `None` 表示定时器触发
    fn on_event(
        &mut self,
        event: Option<&Event>,
        cx: &mut Cursor<'_>,
        view: &mut V,
    ) -> Result<(), SimError>;

    fn on_window_end(&mut self, _cx: &mut Cursor<'_>, _view: &mut V) -> Result<(), SimError> {
        Ok(())
    }
}

/// 钩子内可用的时钟句柄
#[derive(Debug)]
pub struct Cursor<'a> {
    id: &'a NodeId,
    now: SimTime,
    window: Window,
    callbacks: &'a mut TimeHeap,
    wait: &'a mut bool,
    next_ordinal: &'a mut u64,
}

impl Cursor<'_> {
    pub fn node_id(&self) -> &NodeId {
        self.id
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// 登记一个唤醒时间；同一时刻重复登记只触发一次
    pub fn wake_at(&mut self, t: SimTime) -> Result<(), UsageError> {
        if t <= self.now {
            return Err(UsageError::WakeInPast { time: t, now: self.now });
        }
        self.callbacks.push(t);
        Ok(())
    }

    pub fn wake_after(&mut self, ticks: i64) -> Result<(), UsageError> {
        self.wake_at(self.now.saturating_add(ticks))
    }

    /// 在收到回复前不再越过当前时刻
    pub fn wait_for_response(&mut self) {
        *self.wait = true;
    }

    /// 以当前时刻和下一个序号构造本节点的事件
    pub fn event(&mut self, kind: impl Into<EventType>) -> Event {
        let ordinal = *self.next_ordinal;
        *self.next_ordinal = ordinal.saturating_add(1);
        Event::new(self.id.clone(), kind.into(), self.now, ordinal)
    }
}

/// 本次推进能走到哪里
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// 依赖全部完成：推进到窗口边界并触发结束钩子
    Boundary,
    /// 只处理不晚于该时刻的输入与回调
    Until(SimTime),
}

/// 内核交给运行时循环的推进约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    pub reach: Reach,
    /// 仍有请求没收到回复
    pub awaiting: bool,
}

impl Pass {
    pub const FINAL: Pass = Pass {
        reach: Reach::Boundary,
        awaiting: false,
    };

    pub fn until(t: SimTime) -> Self {
        Pass {
            reach: Reach::Until(t),
            awaiting: false,
        }
    }

    pub fn awaiting(self) -> Self {
        Pass {
            awaiting: true,
            ..self
        }
    }

    pub fn is_final(&self) -> bool {
        self.reach == Reach::Boundary
    }

    /// 本次推进的时间上限
    pub fn limit(&self, window: Window) -> SimTime {
        match self.reach {
            Reach::Boundary => window.end,
            Reach::Until(t) => t.min(window.end),
        }
    }
}

/// 一次推进的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// 干净到达窗口边界
    Reached,
    /// 提前退出，停在给定时刻
    Suspended(SimTime),
}

/// 诊断用的有界尾部记录
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub time: SimTime,
    /// `None` 表示定时器触发
    pub kind: Option<EventType>,
}

#[derive(Debug, Clone)]
pub struct TrailingLog {
    cap: usize,
    entries: VecDeque<HistoryEntry>,
}

impl TrailingLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: VecDeque::with_capacity(cap.min(1024)),
        }
    }

    pub fn record(&mut self, time: SimTime, kind: Option<EventType>) {
        if self.cap == 0 {
            return;
        }
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { time, kind });
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 节点自有的运行时状态
#[derive(Debug, Clone)]
pub struct Timeline {
    id: NodeId,
    processed: SimTime,
    window_start: SimTime,
    opened: Option<SimTime>,
    suspended: bool,
    held: Option<SimTime>,
    pending: EventHeap,
    callbacks: TimeHeap,
    next_ordinal: u64,
    history: TrailingLog,
}

impl Timeline {
    pub fn new(id: NodeId) -> Self {
        Self::with_ordering(id, EventOrdering::canonical())
    }

    /// 延后事件按节点自己的事件顺序排列
    pub fn with_ordering(id: NodeId, ordering: EventOrdering) -> Self {
        Self {
            id,
            processed: SimTime::ZERO,
            window_start: SimTime::ZERO,
            opened: None,
            suspended: false,
            held: None,
            pending: EventHeap::new(ordering),
            callbacks: TimeHeap::new(),
            next_ordinal: 0,
            history: TrailingLog::new(DEFAULT_HISTORY_LEN),
        }
    }

    pub fn with_history(mut self, cap: usize) -> Self {
        self.history = TrailingLog::new(cap);
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// 已处理到的时间（高水位）
    pub fn processed(&self) -> SimTime {
        self.processed
    }

    pub fn window_start(&self) -> SimTime {
        self.window_start
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// 等待回复时冻结的 cutoff
    pub fn held_at(&self) -> Option<SimTime> {
        self.held
    }

    /// 最早的内部待办时刻（延后事件或回调）
    pub fn next_due(&self) -> Option<SimTime> {
        let deferred = self.pending.peek().map(|e| e.time);
        match (deferred, self.callbacks.peek()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn history(&self) -> &TrailingLog {
        &self.history
    }

    /// 在窗口开始前登记回调（例如 `initiate` 中）
    pub fn schedule(&mut self, t: SimTime) -> Result<(), UsageError> {
        if t <= self.processed {
            return Err(UsageError::WakeInPast {
                time: t,
                now: self.processed,
            });
        }
        self.callbacks.push(t);
        Ok(())
    }

    /// 按 `pass` 推进时钟；只有 `Reach::Boundary` 才会走到 `window.end`
    pub fn advance<V, B>(
        &mut self,
        window: Window,
        batch: &[Event],
        pass: Pass,
        behavior: &mut B,
        view: &mut V,
    ) -> Result<Progress, SimError>
    where
        V: ?Sized,
        B: Behavior<V> + ?Sized,
    {
        let mut wait = false;
        if !pass.awaiting {
            self.held = None;
        }

        if self.opened != Some(window.end) {
            self.opened = Some(window.end);
            let fire_start = self.processed == window.start;
            self.window_start = window.start;
            if fire_start {
                let mut cx = Cursor {
                    id: &self.id,
                    now: self.processed,
                    window,
                    callbacks: &mut self.callbacks,
                    wait: &mut wait,
                    next_ordinal: &mut self.next_ordinal,
                };
                behavior.on_window_start(&mut cx, view)?;
            }
        }

        for ev in batch {
            if ev.time < self.processed {
                return Err(ProtocolViolation::LateEvent {
                    node: self.id.clone(),
                    time: ev.time,
                    processed: self.processed,
                }
                .into());
            }
            self.pending.push(ev.clone());
        }
        let limit = pass.limit(window);

        let mut cutoff = self.held.or(wait.then_some(self.processed));
        loop {
            let bound = cutoff.unwrap_or(limit);
            let next_ev = self.pending.peek().map(|e| e.time).filter(|t| *t <= bound);
            let next_cb = self.callbacks.peek().filter(|t| *t <= bound);

            let take_event = match (next_ev, next_cb) {
                (None, None) => break,
                (Some(te), Some(tc)) => te <= tc,
                (Some(_), None) => true,
                (None, Some(_)) => false,
            };

            let event = if take_event {
                let ev = self.pending.pop();
                if let Some(t) = next_ev {
                    // 同一时刻的回调被事件吸收
                    if next_cb == Some(t) {
                        self.callbacks.pop();
                    }
                    self.processed = self.processed.max(t);
                }
                ev
            } else {
                if let Some(t) = self.callbacks.pop() {
                    self.processed = self.processed.max(t);
                }
                None
            };

            self.history
                .record(self.processed, event.as_ref().map(|e| e.kind.clone()));
            trace!(node = %self.id, now = %self.processed, kind = ?event.as_ref().map(|e| &e.kind), "处理");

            let mut cx = Cursor {
                id: &self.id,
                now: self.processed,
                window,
                callbacks: &mut self.callbacks,
                wait: &mut wait,
                next_ordinal: &mut self.next_ordinal,
            };
            behavior.on_event(event.as_ref(), &mut cx, view)?;

            if wait && cutoff.is_none() {
                cutoff = Some(self.processed);
            }
        }

        if cutoff.is_some() || !pass.is_final() {
            self.held = cutoff;
            self.suspended = true;
            return Ok(Progress::Suspended(self.processed));
        }

        let mut cx = Cursor {
            id: &self.id,
            now: window.end,
            window,
            callbacks: &mut self.callbacks,
            wait: &mut wait,
            next_ordinal: &mut self.next_ordinal,
        };
        behavior.on_window_end(&mut cx, view)?;

        let leftover = self
            .pending
            .peek()
            .map(|e| e.time)
            .into_iter()
            .chain(self.callbacks.peek())
            .any(|t| t <= window.end);
        if self.processed > window.end || leftover {
            return Err(ProtocolViolation::BoundaryNotReached {
                node: self.id.clone(),
                processed: self.processed,
                boundary: window.end,
            }
            .into());
        }

        self.processed = window.end;
        self.suspended = false;
        Ok(Progress::Reached)
    }
}
