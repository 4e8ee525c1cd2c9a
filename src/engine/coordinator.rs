//! 引擎协调器
//!
//! 持有节点注册表，在单个控制线程上把一个窗口推进到底：
//! 准备 → 运行 → 推进剩余条目（0..n 轮）→ 收尾。
//! 控制线程从不直接运行节点逻辑，唯一的挂起点是等待线程池静默。
//!
//! 每轮静默后重新计算各未完成条目的产出下界：条目自身最早的待办、
//! 依赖的下界、以及（等待回复时）订阅者的下界，取最小值直到不动点，
//! 再把结果作为承诺发布。依赖承诺前移的条目进行部分推进；没有任何条目能推进时，
//! 下界已到边界的等待者被释放，等待留到下一窗口。两者都没有才是循环依赖。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex, RwLock};
use rayon::ThreadPool;
use tracing::{debug, error, info};

use super::entry::{Entry, EntryKind, Standing};
use super::observer::{Observed, Observer};
use super::task;
use crate::config::EngineConfig;
use crate::error::{SimError, TaskFailure, UsageError};
use crate::node::ResponsePair;
use crate::sim::{Event, NodeId, SimTime, Window};

/// 控制线程与任务共享的状态
pub(crate) struct Shared {
    pub(crate) entries: Vec<Entry>,
    index: HashMap<NodeId, usize>,
    pub(crate) observers: Vec<Mutex<Box<dyn Observer>>>,
    window: RwLock<Window>,
    snapshot: Mutex<Vec<Observed>>,
    inflight: AtomicUsize,
    completed: AtomicUsize,
    failures: Mutex<Vec<TaskFailure>>,
    dead: AtomicBool,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl Shared {
    pub(crate) fn new(entries: Vec<Entry>, observers: Vec<Box<dyn Observer>>) -> Self {
        let index = entries
            .iter()
            .map(|e| (e.id.clone(), e.idx))
            .collect();
        Self {
            entries,
            index,
            observers: observers.into_iter().map(Mutex::new).collect(),
            window: RwLock::new(Window::new(SimTime::ZERO, SimTime::ZERO)),
            snapshot: Mutex::new(Vec::new()),
            inflight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            dead: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        }
    }

    pub(crate) fn lookup(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn window(&self) -> Window {
        *self.window.read()
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub(crate) fn task_started(&self) {
        self.inflight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn task_finished(&self) {
        if self.inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }

    /// 依赖承诺的最小值；没有依赖时为无穷远
    pub(crate) fn bound_for(&self, entry: &Entry) -> SimTime {
        entry
            .deps
            .iter()
            .map(|&d| self.entries[d].promised())
            .min()
            .unwrap_or(SimTime::NEVER)
    }

    pub(crate) fn count_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录失败并强制唤醒控制线程
    pub(crate) fn record_failure(&self, failure: TaskFailure) {
        self.failures.lock().push(failure);
        let _guard = self.idle_lock.lock();
        self.idle.notify_all();
    }

    /// 有观察者时把产出镜像到快照缓冲
    pub(crate) fn mirror(&self, events: &[Event], responses: &[ResponsePair]) {
        if self.observers.is_empty() || (events.is_empty() && responses.is_empty()) {
            return;
        }
        let mut snapshot = self.snapshot.lock();
        snapshot.extend(events.iter().cloned().map(Observed::Event));
        snapshot.extend(responses.iter().cloned().map(Observed::Response));
    }
}

/// 仿真引擎（协调器 + 注册表）
pub struct Engine {
    shared: Arc<Shared>,
    pool: ThreadPool,
    clock: SimTime,
    config: EngineConfig,
}

impl Engine {
    pub(crate) fn new(shared: Shared, config: EngineConfig, clock: SimTime) -> Result<Self, SimError> {
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?;
        Ok(Self {
            shared: Arc::new(shared),
            pool,
            clock,
            config,
        })
    }

    /// 已提交的时钟
    pub fn clock(&self) -> SimTime {
        self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_dead(&self) -> bool {
        self.shared.is_dead()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.shared.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn kind(&self, id: &NodeId) -> Result<EntryKind, UsageError> {
        Ok(self.entry(id)?.kind)
    }

    pub fn dependencies(&self, id: &NodeId) -> Result<Vec<NodeId>, UsageError> {
        let entry = self.entry(id)?;
        Ok(self.ids(&entry.deps))
    }

    pub fn subscribers(&self, id: &NodeId) -> Result<Vec<NodeId>, UsageError> {
        let entry = self.entry(id)?;
        Ok(self.ids(&entry.subscribers))
    }

    /// 以具体类型只读访问节点；类型不符时返回 `None`
    pub fn with_node<T, R>(&self, id: &NodeId, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: 'static,
    {
        let idx = self.shared.lookup(id)?;
        let slot = self.shared.entries[idx].slot.lock();
        slot.as_any().downcast_ref::<T>().map(f)
    }

    fn entry(&self, id: &NodeId) -> Result<&Entry, UsageError> {
        self.shared
            .lookup(id)
            .map(|idx| &self.shared.entries[idx])
            .ok_or_else(|| UsageError::UnknownId(id.clone()))
    }

    fn ids(&self, idxs: &[usize]) -> Vec<NodeId> {
        idxs.iter()
            .map(|&i| self.shared.entries[i].id.clone())
            .collect()
    }

    /// 把仿真推进到 `target`：窗口 `(clock, target]` 要么完整提交，要么引擎失效
    #[tracing::instrument(skip(self), fields(clock = %self.clock, target = %target))]
    pub fn evaluate(&mut self, target: SimTime) -> Result<(), SimError> {
        if self.shared.is_dead() {
            return Err(SimError::Dead);
        }
        if target <= self.clock {
            return Err(UsageError::NonMonotonicWindow {
                clock: self.clock,
                target,
            }
            .into());
        }

        // 准备
        let window = Window::new(self.clock, target);
        *self.shared.window.write() = window;
        self.shared.completed.store(0, Ordering::SeqCst);
        self.shared.snapshot.lock().clear();
        let mut goal = 0;
        for entry in &self.shared.entries {
            entry.reset_window(window);
            if !entry.is_detached() {
                goal += 1;
            }
        }
        debug!(
            goal,
            detached = self.shared.entries.len() - goal,
            "📋 准备窗口"
        );

        // 运行
        let roots: Vec<usize> = self
            .shared
            .entries
            .iter()
            .filter(|e| e.self_starts() && e.sched.lock().try_queue())
            .map(|e| e.idx)
            .collect();
        debug!(roots = roots.len(), "▶️  提交自启动条目");
        self.submit_all(&roots);
        self.wait_quiescent()?;

        // 推进剩余条目
        let mut round = 0usize;
        while self.shared.completed.load(Ordering::SeqCst) < goal {
            let plan = self.plan_round(window);
            if plan.ready.is_empty() && plan.released.is_empty() {
                let pending: Vec<NodeId> = self
                    .shared
                    .entries
                    .iter()
                    .filter(|e| !e.is_detached() && !e.is_complete())
                    .map(|e| e.id.clone())
                    .collect();
                self.shared.mark_dead();
                error!(?pending, "🔁 检测到循环依赖，窗口无法完成");
                return Err(SimError::CircularDependency {
                    window_end: target,
                    pending,
                });
            }
            round += 1;
            if !plan.released.is_empty() {
                info!(released = ?self.ids(&plan.released), "⏸️  等待跨越窗口边界");
            }
            debug!(round, ready = plan.ready.len(), "🔄 继续推进");
            self.submit_all(&plan.ready);
            self.wait_quiescent()?;
        }

        // 收尾
        if !self.shared.observers.is_empty() {
            let mut snapshot = std::mem::take(&mut *self.shared.snapshot.lock());
            Observed::sort(&mut snapshot);
            let snapshot: Arc<[Observed]> = snapshot.into();
            let shared = &self.shared;
            self.pool.install(|| {
                for i in 0..shared.observers.len() {
                    task::submit_observer(shared, i, Arc::clone(&snapshot));
                }
            });
            self.wait_quiescent()?;
        }

        self.clock = target;
        info!(clock = %self.clock, drain_rounds = round, "✅ 窗口已提交");
        Ok(())
    }

    /// 静默时规划下一轮：发布承诺，挑出能推进的条目；都不能推进时释放等待者
    fn plan_round(&self, window: Window) -> Plan {
        let entries = &self.shared.entries;
        let standing: Vec<Standing> = entries.iter().map(|e| e.standing(window)).collect();
        let settled =
            |i: usize| standing[i].complete || entries[i].kind == EntryKind::Sink;

        let mut floor: Vec<SimTime> = (0..entries.len())
            .map(|i| if settled(i) { SimTime::NEVER } else { standing[i].held })
            .collect();
        let mut changed = true;
        while changed {
            changed = false;
            for (i, e) in entries.iter().enumerate() {
                if settled(i) {
                    continue;
                }
                let repliers: &[usize] = if standing[i].awaiting { &e.subscribers } else { &[] };
                let low = e
                    .deps
                    .iter()
                    .chain(repliers)
                    .map(|&j| floor[j])
                    .fold(floor[i], SimTime::min);
                if low < floor[i] {
                    floor[i] = low;
                    changed = true;
                }
            }
        }
        for (i, e) in entries.iter().enumerate() {
            if !settled(i) {
                e.promise(floor[i]);
            }
        }

        let mut plan = Plan::default();
        for (i, e) in entries.iter().enumerate() {
            let st = &standing[i];
            let wanted = !settled(i) && !e.is_detached() && {
                let bound = self.shared.bound_for(e).min(window.end);
                st.fresh
                    || (!st.awaiting && bound > st.reach)
                    || st.next_input.is_some_and(|t| t <= bound)
            };
            if e.claim(wanted) {
                plan.ready.push(i);
            }
        }
        if !plan.ready.is_empty() {
            return plan;
        }

        for (i, e) in entries.iter().enumerate() {
            if standing[i].awaiting && floor[i] >= window.end && e.release() {
                plan.released.push(i);
            }
        }
        for &i in &plan.released {
            let e = &entries[i];
            if !e.is_detached() {
                self.shared.count_completed();
            }
            for &sub in &e.subscribers {
                if entries[sub].offer(&[], true) {
                    plan.ready.push(sub);
                }
            }
        }
        plan
    }

    fn submit_all(&self, idxs: &[usize]) {
        let shared = &self.shared;
        self.pool.install(|| {
            for &idx in idxs {
                task::submit(shared, idx);
            }
        });
    }

    /// 阻塞直到没有在途任务；任何任务失败都会提前唤醒并以聚合错误返回
    fn wait_quiescent(&self) -> Result<(), SimError> {
        {
            let mut guard = self.shared.idle_lock.lock();
            while self.shared.inflight.load(Ordering::SeqCst) > 0
                && self.shared.failures.lock().is_empty()
            {
                self.shared.idle.wait(&mut guard);
            }
        }
        let failures = std::mem::take(&mut *self.shared.failures.lock());
        if failures.is_empty() {
            return Ok(());
        }
        self.shared.mark_dead();
        error!(count = failures.len(), "💥 任务失败，引擎失效");
        Err(SimError::TaskFailures(failures))
    }

    /// 深拷贝出一个独立的引擎（节点通过 `copy()` 复制），时钟相同，不带观察者
    pub fn fork(&self) -> Result<Engine, SimError> {
        if self.shared.is_dead() {
            return Err(SimError::Dead);
        }
        let entries = self.shared.entries.iter().map(Entry::duplicate).collect();
        Engine::new(Shared::new(entries, Vec::new()), self.config.clone(), self.clock)
    }

    /// 由节点配置与拓扑折叠出的 64 位 FNV-1a 摘要（用于复现性校验）
    pub fn configuration_digest(&self) -> u64 {
        let mut h = Fnv1a::default();
        for entry in &self.shared.entries {
            h.write(entry.id.as_str());
            h.write(entry.kind.name());
            for &dep in &entry.deps {
                h.write(self.shared.entries[dep].id.as_str());
            }
            for (k, v) in entry.slot.lock().configuration() {
                h.write(&k);
                h.write(&v);
            }
        }
        h.finish()
    }
}

/// 一轮规划的结果
#[derive(Debug, Default)]
struct Plan {
    ready: Vec<usize>,
    released: Vec<usize>,
}

#[derive(Debug)]
struct Fnv1a(u64);

impl Default for Fnv1a {
    fn default() -> Self {
        Fnv1a(0xcbf2_9ce4_8422_2325)
    }
}

impl Fnv1a {
    fn write(&mut self, s: &str) {
        for b in s.as_bytes().iter().chain(std::iter::once(&0xff)) {
            self.0 ^= u64::from(*b);
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}
