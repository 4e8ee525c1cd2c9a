//! 窗口执行任务
//!
//! 每个就绪条目对应线程池上的一个任务。三种角色共用同一骨架：
//! 占用处理标记 → 以角色视图调用节点 → 排空入站队列 → 锁存完成标记 →
//! 释放处理标记 → 扇出 → 报告完成（承诺随之推到无穷远）。区别只在扇出：
//! - Sink：无
//! - Responder：把回复点对点送回请求的生产者
//! - Evaluator：向所有订阅者广播事件并计入依赖完成，再投递回复

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::coordinator::Shared;
use super::entry::{Due, Entry, EntryKind, Role};
use super::observer::Observed;
use crate::error::{FailureCause, SimError, TaskFailure, UsageError};
use crate::node::{EvaluatorView, Outbox, ResponderView, ResponsePair, SinkView};
use crate::sim::{Event, NodeId};

/// 一次节点调用的输出
struct Invocation {
    events: Vec<Event>,
    responses: Vec<ResponsePair>,
    newly_complete: bool,
}

/// 提交一个条目；调用方负责通过 `Sched::try_queue` 去重
pub(crate) fn submit(shared: &Arc<Shared>, idx: usize) {
    shared.task_started();
    let shared = Arc::clone(shared);
    rayon::spawn(move || {
        run_guarded(&shared, idx);
        shared.task_finished();
    });
}

/// 把整理好的快照作为一个任务交给第 `i` 个观察者
pub(crate) fn submit_observer(shared: &Arc<Shared>, i: usize, snapshot: Arc<[Observed]>) {
    shared.task_started();
    let shared = Arc::clone(shared);
    rayon::spawn(move || {
        let window = shared.window();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            shared.observers[i].lock().observe(window, &snapshot)
        }));
        if let Some(cause) = failure_cause(outcome) {
            shared.record_failure(TaskFailure {
                node: NodeId::new(format!("observer#{i}")),
                cause,
            });
        }
        shared.task_finished();
    });
}

fn run_guarded(shared: &Arc<Shared>, idx: usize) {
    if shared.is_dead() {
        return;
    }
    let entry = &shared.entries[idx];
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match entry.kind {
        EntryKind::Sink => sink_task(shared, entry),
        EntryKind::Responder => responder_task(shared, entry),
        EntryKind::Evaluator => evaluator_task(shared, entry),
    }));
    if let Some(cause) = failure_cause(outcome) {
        warn!(node = %entry.id, %cause, "❌ 任务失败");
        shared.record_failure(TaskFailure {
            node: entry.id.clone(),
            cause,
        });
    }
}

fn failure_cause(
    outcome: std::thread::Result<Result<(), SimError>>,
) -> Option<FailureCause> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(FailureCause::Error(e)),
        Err(payload) => Some(FailureCause::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn sink_task(shared: &Arc<Shared>, entry: &Entry) -> Result<(), SimError> {
    let inv = invoke(shared, entry)?;
    report_completion(shared, entry, inv.newly_complete);
    Ok(())
}

fn responder_task(shared: &Arc<Shared>, entry: &Entry) -> Result<(), SimError> {
    let inv = invoke(shared, entry)?;
    shared.mirror(&inv.events, &inv.responses);
    deliver_responses(shared, entry, inv.responses.iter())?;
    report_completion(shared, entry, inv.newly_complete);
    Ok(())
}

fn evaluator_task(shared: &Arc<Shared>, entry: &Entry) -> Result<(), SimError> {
    let inv = invoke(shared, entry)?;
    shared.mirror(&inv.events, &inv.responses);

    let (inline, rest): (Vec<&ResponsePair>, Vec<&ResponsePair>) =
        inv.responses.iter().partition(|pair| {
            entry
                .subscribers
                .iter()
                .any(|&s| shared.entries[s].id == pair.request.producer)
        });

    for &sub in &entry.subscribers {
        let target = &shared.entries[sub];
        if target.offer(&inv.events, inv.newly_complete) {
            trace!(from = %entry.id, to = %target.id, "依赖全部完成，提交订阅者");
            submit(shared, sub);
        }
        for pair in inline.iter().filter(|p| p.request.producer == target.id) {
            if target.deliver_response(pair, &entry.id)? {
                submit(shared, sub);
            }
        }
    }

    deliver_responses(shared, entry, rest.into_iter())?;
    report_completion(shared, entry, inv.newly_complete);
    Ok(())
}

/// 调用节点逻辑；处理标记（节点槽位锁）在函数返回前释放
fn invoke(shared: &Shared, entry: &Entry) -> Result<Invocation, SimError> {
    let window = shared.window();
    let mut slot = entry.slot.lock();
    let bound = shared.bound_for(entry);
    let input = entry.begin_run(window, bound);
    trace!(node = %entry.id, inbound = input.batch.len(), pass = ?input.pass, "调用节点");

    let mut out = Outbox::new(
        entry.id.clone(),
        window,
        input.last_time,
        input.next_ordinal,
        input.floor,
    );
    let base = SinkView::new(window, &input.batch, input.pass);
    match &mut *slot {
        Role::Sink(node) => {
            let mut view = base;
            node.consume(window.end, &mut view)?;
        }
        Role::Responder(node) => {
            let mut view = ResponderView::new(base, &mut out);
            node.consume(window.end, &mut view)?;
        }
        Role::Evaluator(node) => {
            let mut view = EvaluatorView::new(ResponderView::new(base, &mut out));
            node.consume(window.end, &mut view)?;
        }
    }

    let awaiting = std::mem::take(&mut out.awaiting);
    let newly_complete = entry.finish_run(
        awaiting,
        out.keep_active,
        out.last_time(),
        out.next_ordinal(),
        input.pass.is_final(),
        Due::from(out.next_due),
    );
    drop(slot);

    Ok(Invocation {
        events: out.events,
        responses: out.responses,
        newly_complete,
    })
}

fn deliver_responses<'a>(
    shared: &Arc<Shared>,
    entry: &Entry,
    responses: impl Iterator<Item = &'a ResponsePair>,
) -> Result<(), SimError> {
    for pair in responses {
        let target = shared
            .lookup(&pair.request.producer)
            .ok_or_else(|| UsageError::UnknownId(pair.request.producer.clone()))?;
        if shared.entries[target].deliver_response(pair, &entry.id)? {
            trace!(from = %entry.id, to = %pair.request.producer, "未决回复已清空，重新提交");
            submit(shared, target);
        }
    }
    Ok(())
}

fn report_completion(shared: &Shared, entry: &Entry, newly_complete: bool) {
    if !newly_complete {
        return;
    }
    entry.settle();
    debug!(node = %entry.id, idx = entry.idx, "✅ 条目完成");
    if !entry.is_detached() {
        shared.count_completed();
    }
}
