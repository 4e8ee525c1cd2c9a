//! 调度条目
//!
//! 每个注册节点对应一个内核持有的条目，记录依赖完成计数、入站队列、
//! 未决回复列表与活跃标记。调度字段只在该条目自己的锁内访问；
//! 节点槽位的锁充当“正在处理”标记，保证同一时刻最多一次物理调用。
//!
//! 依赖未完成时的部分推进靠“承诺”约束：`promised` 是本条目在本窗口内
//! 不会再早于它产出事件或回复的时刻，下游只推进到依赖承诺的最小值。

use std::any::Any;

use parking_lot::Mutex;

use crate::error::ProtocolViolation;
use crate::node::{
    Configuration, EvaluatorNode, EventFilter, Pass, Reach, ResponderNode, ResponsePair, SinkNode,
};
use crate::queue::EventHeap;
use crate::sim::{Event, EventOrdering, NodeId, SimTime, TypeOrder, Window};

/// 条目角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Sink,
    Responder,
    Evaluator,
}

impl EntryKind {
    pub fn name(self) -> &'static str {
        match self {
            EntryKind::Sink => "sink",
            EntryKind::Responder => "responder",
            EntryKind::Evaluator => "evaluator",
        }
    }
}

/// 条目持有的节点
pub(crate) enum Role {
    Sink(Box<dyn SinkNode>),
    Responder(Box<dyn ResponderNode>),
    Evaluator(Box<dyn EvaluatorNode>),
}

impl Role {
    pub(crate) fn kind(&self) -> EntryKind {
        match self {
            Role::Sink(_) => EntryKind::Sink,
            Role::Responder(_) => EntryKind::Responder,
            Role::Evaluator(_) => EntryKind::Evaluator,
        }
    }

    pub(crate) fn id(&self) -> &NodeId {
        match self {
            Role::Sink(n) => n.id(),
            Role::Responder(n) => n.id(),
            Role::Evaluator(n) => n.id(),
        }
    }

    pub(crate) fn accepts(&self) -> EventFilter {
        match self {
            Role::Sink(n) => n.accepts(),
            Role::Responder(n) => n.accepts(),
            Role::Evaluator(n) => n.accepts(),
        }
    }

    pub(crate) fn type_order(&self) -> Option<TypeOrder> {
        match self {
            Role::Sink(n) => n.type_order(),
            Role::Responder(n) => n.type_order(),
            Role::Evaluator(n) => n.type_order(),
        }
    }

    pub(crate) fn configuration(&self) -> Configuration {
        match self {
            Role::Sink(n) => n.configuration(),
            Role::Responder(n) => n.configuration(),
            Role::Evaluator(n) => n.configuration(),
        }
    }

    pub(crate) fn as_any(&self) -> &dyn Any {
        match self {
            Role::Sink(n) => n.as_any(),
            Role::Responder(n) => n.as_any(),
            Role::Evaluator(n) => n.as_any(),
        }
    }

    pub(crate) fn copy(&self) -> Role {
        match self {
            Role::Sink(n) => Role::Sink(n.copy()),
            Role::Responder(n) => Role::Responder(n.copy()),
            Role::Evaluator(n) => Role::Evaluator(n.copy()),
        }
    }
}

/// 节点最近一次报告的内部待办
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Due {
    /// 最近一次调用没有报告
    Unknown,
    /// 只会被新输入唤醒
    Idle,
    At(SimTime),
}

impl From<Option<Option<SimTime>>> for Due {
    fn from(report: Option<Option<SimTime>>) -> Self {
        match report {
            None => Due::Unknown,
            Some(None) => Due::Idle,
            Some(Some(t)) => Due::At(t),
        }
    }
}

/// 静默时刻的条目快照，供协调器规划下一轮
#[derive(Debug, Clone, Copy)]
pub(crate) struct Standing {
    pub(crate) complete: bool,
    pub(crate) awaiting: bool,
    /// 本窗口还没调用过，且不知道内部待办
    pub(crate) fresh: bool,
    pub(crate) reach: SimTime,
    pub(crate) next_input: Option<SimTime>,
    /// 不借助新输入时最早可能产出的时刻
    pub(crate) held: SimTime,
}

/// 受条目锁保护的调度字段
#[derive(Debug, Clone)]
pub(crate) struct Sched {
    pub(crate) inbound: EventHeap,
    pub(crate) completed_deps: usize,
    pub(crate) complete: bool,
    pub(crate) queued: bool,
    pub(crate) active: bool,
    pub(crate) keep_active: bool,
    /// 按登记顺序排列，最早的在前
    pub(crate) outstanding: Vec<Event>,
    pub(crate) last_time: SimTime,
    pub(crate) next_ordinal: u64,
    pub(crate) promised: SimTime,
    /// 本窗口内调用时给过的最大推进上限
    pub(crate) reach: SimTime,
    pub(crate) ran: bool,
    pub(crate) due: Due,
}

impl Sched {
    fn new(ordering: EventOrdering) -> Self {
        Self {
            inbound: EventHeap::new(ordering),
            completed_deps: 0,
            complete: false,
            queued: false,
            active: false,
            keep_active: false,
            outstanding: Vec::new(),
            last_time: SimTime::ZERO,
            next_ordinal: 0,
            promised: SimTime::ZERO,
            reach: SimTime::ZERO,
            ran: false,
            due: Due::Unknown,
        }
    }

    /// 标记为已入队；已在队列中则返回 false
    pub(crate) fn try_queue(&mut self) -> bool {
        if self.queued {
            return false;
        }
        self.queued = true;
        true
    }
}

/// 一次调用开始时从条目中取出的输入
pub(crate) struct RunInput {
    pub(crate) batch: Vec<Event>,
    pub(crate) pass: Pass,
    pub(crate) last_time: SimTime,
    pub(crate) next_ordinal: u64,
    pub(crate) floor: SimTime,
}

pub(crate) struct Entry {
    pub(crate) idx: usize,
    pub(crate) id: NodeId,
    pub(crate) kind: EntryKind,
    pub(crate) deps: Vec<usize>,
    pub(crate) subscribers: Vec<usize>,
    pub(crate) filter: EventFilter,
    pub(crate) sched: Mutex<Sched>,
    pub(crate) slot: Mutex<Role>,
}

impl Entry {
    pub(crate) fn new(idx: usize, role: Role, deps: Vec<usize>, subscribers: Vec<usize>) -> Self {
        let id = role.id().clone();
        let filter = role.accepts();
        let ordering = EventOrdering::from_override(role.type_order());
        Self {
            idx,
            id,
            kind: role.kind(),
            deps,
            subscribers,
            filter,
            sched: Mutex::new(Sched::new(ordering)),
            slot: Mutex::new(role),
        }
    }

    /// 复制出一个拓扑相同、节点深拷贝的条目（只在窗口之间调用）
    pub(crate) fn duplicate(&self) -> Self {
        let role = self.slot.lock().copy();
        let sched = self.sched.lock().clone();
        Self {
            idx: self.idx,
            id: self.id.clone(),
            kind: self.kind,
            deps: self.deps.clone(),
            subscribers: self.subscribers.clone(),
            filter: self.filter.clone(),
            sched: Mutex::new(sched),
            slot: Mutex::new(role),
        }
    }

    /// 没有依赖、也没有订阅者（或不是 evaluator）的条目不可能被任何触发到达
    pub(crate) fn is_detached(&self) -> bool {
        self.deps.is_empty() && (self.kind != EntryKind::Evaluator || self.subscribers.is_empty())
    }

    /// 零依赖的 evaluator 在窗口开始时自启动
    pub(crate) fn self_starts(&self) -> bool {
        self.kind == EntryKind::Evaluator && self.deps.is_empty()
    }

    pub(crate) fn reset_window(&self, window: Window) {
        let mut s = self.sched.lock();
        s.completed_deps = 0;
        s.complete = false;
        s.queued = false;
        s.active = false;
        s.promised = window.start;
        s.reach = window.start;
        s.ran = false;
    }

    /// 开始一次调用：排空入站队列并清除活跃标记。
    /// `bound` 是依赖承诺的最小值，只在依赖未全部完成时生效。
    pub(crate) fn begin_run(&self, window: Window, bound: SimTime) -> RunInput {
        let mut s = self.sched.lock();
        s.queued = false;
        s.active = false;
        s.ran = true;
        let reach = if s.completed_deps >= self.deps.len() {
            Reach::Boundary
        } else {
            Reach::Until(bound.min(window.end))
        };
        let pass = Pass {
            reach,
            awaiting: !s.outstanding.is_empty(),
        };
        s.reach = s.reach.max(pass.limit(window));
        RunInput {
            batch: s.inbound.drain_sorted(),
            pass,
            last_time: s.last_time,
            next_ordinal: s.next_ordinal,
            floor: s.promised,
        }
    }

    /// 结束一次调用：登记新的未决请求并锁存完成标记；返回是否首次完成
    pub(crate) fn finish_run(
        &self,
        awaiting: Vec<Event>,
        keep_active: bool,
        last_time: SimTime,
        next_ordinal: u64,
        deps_complete: bool,
        due: Due,
    ) -> bool {
        let mut s = self.sched.lock();
        s.outstanding.extend(awaiting);
        s.keep_active = keep_active;
        s.last_time = last_time;
        s.next_ordinal = next_ordinal;
        s.due = due;
        if !s.complete && deps_complete && s.outstanding.is_empty() {
            s.complete = true;
            return true;
        }
        false
    }

    /// 订阅者接受一批广播事件；`credit` 为真时计入一个完成的依赖。
    /// 返回调用方是否需要把本条目提交执行。
    pub(crate) fn offer(&self, events: &[Event], credit: bool) -> bool {
        let mut s = self.sched.lock();
        for ev in events.iter().filter(|ev| self.filter.accepts(ev)) {
            if self.kind == EntryKind::Responder && (ev.demands_reply() || s.keep_active) {
                s.active = true;
            }
            s.inbound.push(ev.clone());
        }
        if credit {
            debug_assert!(s.completed_deps < self.deps.len());
            s.completed_deps += 1;
            if s.completed_deps == self.deps.len() {
                return s.try_queue();
            }
        }
        false
    }

    /// 把回复匹配到最早的同一身份未决请求。匹配后回复作为普通入站事件排队；
    /// 若未决列表因此清空，返回调用方需要重新提交本条目。
    pub(crate) fn deliver_response(
        &self,
        pair: &ResponsePair,
        responder: &NodeId,
    ) -> Result<bool, ProtocolViolation> {
        let mut s = self.sched.lock();
        let pos = s
            .outstanding
            .iter()
            .position(|req| req.same_identity(&pair.request));
        let Some(pos) = pos else {
            if pair.request.producer == self.id && pair.request.ordinal >= s.next_ordinal {
                return Err(ProtocolViolation::ResponseBeforeRequest {
                    target: self.id.clone(),
                    reply: pair.reply.kind.clone(),
                    ordinal: pair.request.ordinal,
                });
            }
            return Err(ProtocolViolation::UnmatchedResponse {
                responder: responder.clone(),
                target: self.id.clone(),
                reply: pair.reply.kind.clone(),
            });
        };
        s.outstanding.remove(pos);
        if self.kind == EntryKind::Responder && (pair.reply.demands_reply() || s.keep_active) {
            s.active = true;
        }
        s.inbound.push(pair.reply.clone());
        if s.outstanding.is_empty() {
            return Ok(s.try_queue());
        }
        Ok(false)
    }

    /// 未完成的条目在需要推进（或带活跃标记）时入队
    pub(crate) fn claim(&self, wanted: bool) -> bool {
        let mut s = self.sched.lock();
        (wanted || s.active) && !s.complete && s.try_queue()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.sched.lock().complete
    }

    pub(crate) fn promised(&self) -> SimTime {
        self.sched.lock().promised
    }

    /// 承诺只会前移
    pub(crate) fn promise(&self, floor: SimTime) {
        let mut s = self.sched.lock();
        s.promised = s.promised.max(floor);
    }

    /// 完成后本窗口不再产出
    pub(crate) fn settle(&self) {
        self.sched.lock().promised = SimTime::NEVER;
    }

    /// 把本窗口收不到回复的等待者标记为完成，等待留到下一窗口；
    /// 已完成则返回 false
    pub(crate) fn release(&self) -> bool {
        let mut s = self.sched.lock();
        if s.complete {
            return false;
        }
        s.complete = true;
        true
    }

    pub(crate) fn standing(&self, window: Window) -> Standing {
        let s = self.sched.lock();
        // 结束钩子还没触发，最晚也可能在边界产出
        let internal = match s.due {
            Due::Unknown => s.reach,
            Due::Idle => window.end,
            Due::At(t) => t.min(window.end),
        };
        let next_input = s.inbound.peek().map(|e| e.time);
        Standing {
            complete: s.complete,
            awaiting: !s.outstanding.is_empty(),
            fresh: !s.ran && s.due == Due::Unknown,
            reach: s.reach,
            next_input,
            held: next_input.map_or(internal, |t| t.min(internal)),
        }
    }
}
