//! 事件类型
//!
//! 定义节点标识、事件类型标签以及在依赖图上流动的不可变事件值。

use super::time::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// 节点标识符（字符串，构图时校验格式）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 合法 id：非空，仅包含字母数字与 `-_.:/`
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/'))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId::new(s)
    }
}

/// 事件类型标签（开放集合，按字典序可比较）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Arc<str>);

impl EventType {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(Arc::from(tag.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        EventType::new(s)
    }
}

/// 事件携带的数值量（例如持续时间、损失金额）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Magnitude {
    pub value: f64,
    #[serde(default = "Magnitude::default_unit")]
    pub unit: String,
}

impl Magnitude {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    fn default_unit() -> String {
        "none".to_string()
    }
}

/// 事件身份：同一生产者内序号唯一
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub producer: NodeId,
    pub ordinal: u64,
}

/// 不可变事件值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "producerId")]
    pub producer: NodeId,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub time: SimTime,
    pub ordinal: u64,
    #[serde(default)]
    pub response_types: BTreeSet<EventType>,
    #[serde(default)]
    pub caused_by: Vec<Arc<Event>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<Magnitude>,
}

impl Event {
    pub fn new(producer: NodeId, kind: EventType, time: SimTime, ordinal: u64) -> Self {
        Self {
            producer,
            kind,
            time,
            ordinal,
            response_types: BTreeSet::new(),
            caused_by: Vec::new(),
            magnitude: None,
        }
    }

    /// 声明允许的回复类型（非空即表示该事件需要回复）
    pub fn with_response_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.response_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// 追加因果父事件（溯源用）
    pub fn caused_by(mut self, parent: &Event) -> Self {
        self.caused_by.push(Arc::new(parent.clone()));
        self
    }

    pub fn with_magnitude(mut self, magnitude: Magnitude) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            producer: self.producer.clone(),
            ordinal: self.ordinal,
        }
    }

    pub fn demands_reply(&self) -> bool {
        !self.response_types.is_empty()
    }

    pub fn permits_reply(&self, kind: &EventType) -> bool {
        self.response_types.contains(kind)
    }

    /// 两个事件是否为同一个（生产者 + 序号）
    pub fn same_identity(&self, other: &Event) -> bool {
        self.ordinal == other.ordinal && self.producer == other.producer
    }
}
