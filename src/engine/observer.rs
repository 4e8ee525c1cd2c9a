//! 全局观察者
//!
//! 存在观察者时，窗口内产生的每个事件/回复都会镜像到共享快照缓冲；
//! 窗口收尾时快照按规范顺序整理后，作为一个任务分发给每个观察者。

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::node::ResponsePair;
use crate::sim::{Event, EventOrdering, Window};

/// 快照中的一项
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Event(Event),
    Response(ResponsePair),
}

impl Observed {
    /// 用于排序的代表事件（回复取回复本身）
    pub fn event(&self) -> &Event {
        match self {
            Observed::Event(ev) => ev,
            Observed::Response(pair) => &pair.reply,
        }
    }

    pub(crate) fn sort(snapshot: &mut [Observed]) {
        let order = EventOrdering::canonical();
        snapshot.sort_by(|a, b| order.compare(a.event(), b.event()));
    }
}

pub trait Observer: Send {
    fn observe(&mut self, window: Window, snapshot: &[Observed]) -> Result<(), SimError>;
}

/// 一条可回放的 trace 记录（JSON）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub window_end: i64,
    pub producer: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub time: i64,
    pub ordinal: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<TraceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRef {
    pub producer: String,
    pub ordinal: u64,
}

/// 一个简单的 trace 收集器（存内存，仿真结束写 JSON 文件）。
/// 克隆共享同一份记录，注册前留一份句柄用于读取。
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    records: Arc<Mutex<Vec<TraceRecord>>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.records.lock())
    }
}

impl Observer for TraceRecorder {
    fn observe(&mut self, window: Window, snapshot: &[Observed]) -> Result<(), SimError> {
        let mut records = self.records.lock();
        for item in snapshot {
            let ev = item.event();
            let in_response_to = match item {
                Observed::Event(_) => None,
                Observed::Response(pair) => Some(TraceRef {
                    producer: pair.request.producer.to_string(),
                    ordinal: pair.request.ordinal,
                }),
            };
            records.push(TraceRecord {
                window_end: window.end.ticks(),
                producer: ev.producer.to_string(),
                kind: ev.kind.to_string(),
                time: ev.time.ticks(),
                ordinal: ev.ordinal,
                in_response_to,
                magnitude: ev.magnitude.as_ref().map(|m| m.value),
            });
        }
        Ok(())
    }
}
