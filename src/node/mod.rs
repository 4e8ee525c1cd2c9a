//! 节点角色契约
//!
//! 内核消费的三种节点角色：
//! - `SinkNode`：只消费入站事件
//! - `ResponderNode`：额外可以点对点回复请求
//! - `EvaluatorNode`：额外可以向订阅者广播事件，可自启动
//!
//! 具体的失效/修复、资源竞争、风险传播节点都是基于这些契约的客户端代码。

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::SimError;
use crate::sim::{Event, EventType, NodeId, SimTime, TypeOrder};

pub mod runtime;
mod view;

pub use runtime::{Behavior, Cursor, HistoryEntry, Pass, Progress, Reach, Timeline, TrailingLog};
pub use view::{EvaluatorView, ResponderView, ResponsePair, SinkView};
pub(crate) use view::Outbox;

/// 字符串键的配置快照（用于复现性摘要）
pub type Configuration = BTreeMap<String, String>;

/// 订阅者的事件接受过滤器
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    Types(BTreeSet<EventType>),
}

impl EventFilter {
    pub fn types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        EventFilter::Types(types.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, ev: &Event) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Types(types) => types.contains(&ev.kind),
        }
    }
}

/// `initiate` 收到的构图信息
#[derive(Debug, Clone)]
pub struct InitInfo {
    pub id: NodeId,
    pub dependencies: Vec<NodeId>,
    pub subscribers: Vec<NodeId>,
    pub history_len: usize,
}

/// 所有角色共有的部分
pub trait Node: Send + Any {
    fn id(&self) -> &NodeId;

    /// 作为订阅者时接受哪些事件
    fn accepts(&self) -> EventFilter {
        EventFilter::All
    }

    /// 覆盖规范顺序中的“类型”层
    fn type_order(&self) -> Option<TypeOrder> {
        None
    }

    fn configuration(&self) -> Configuration {
        Configuration::new()
    }

    fn as_any(&self) -> &dyn Any;
}

pub trait SinkNode: Node {
    fn consume(&mut self, window_end: SimTime, view: &mut SinkView<'_>) -> Result<(), SimError>;

    fn copy(&self) -> Box<dyn SinkNode>;
}

pub trait ResponderNode: Node {
    fn consume(
        &mut self,
        window_end: SimTime,
        view: &mut ResponderView<'_>,
    ) -> Result<(), SimError>;

    fn copy(&self) -> Box<dyn ResponderNode>;
}

pub trait EvaluatorNode: Node {
    /// 首次执行前调用一次
    fn initiate(&mut self, _info: &InitInfo) -> Result<(), SimError> {
        Ok(())
    }

    fn consume(
        &mut self,
        window_end: SimTime,
        view: &mut EvaluatorView<'_>,
    ) -> Result<(), SimError>;

    fn copy(&self) -> Box<dyn EvaluatorNode>;
}
