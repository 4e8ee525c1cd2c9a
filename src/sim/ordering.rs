//! 事件的规范全序
//!
//! 默认顺序：时间 → 生产者 id → 序号 → 类型标签。节点只能覆盖“类型”这一层：
//! 覆盖后的类型层排在生产者之前，使同一时刻来自不同角色的事件按固定相对顺序到达
//! （例如 条件开始 < 触发 < 条件结束）。其余各层始终按相同规则施加。

use super::event::{Event, EventType};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type TypeCmp = dyn Fn(&EventType, &EventType) -> Ordering + Send + Sync;

/// 节点提供的类型层比较器
#[derive(Clone)]
pub struct TypeOrder(Arc<TypeCmp>);

impl TypeOrder {
    pub fn new<F>(cmp: F) -> Self
    where
        F: Fn(&EventType, &EventType) -> Ordering + Send + Sync + 'static,
    {
        Self(Arc::new(cmp))
    }

    /// 按给定列表排名；未列出的类型排在所有列出类型之后，彼此视为相等。
    pub fn ranked<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        let ranks: Vec<EventType> = types.into_iter().map(Into::into).collect();
        Self::new(move |a, b| {
            let rank = |t: &EventType| ranks.iter().position(|r| r == t).unwrap_or(ranks.len());
            rank(a).cmp(&rank(b))
        })
    }

    fn compare(&self, a: &EventType, b: &EventType) -> Ordering {
        (self.0)(a, b)
    }
}

impl fmt::Debug for TypeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TypeOrder(..)")
    }
}

/// 规范事件顺序（可带节点级的类型层覆盖）
#[derive(Debug, Clone, Default)]
pub struct EventOrdering {
    type_order: Option<TypeOrder>,
}

impl EventOrdering {
    pub fn canonical() -> Self {
        Self::default()
    }

    pub fn with_type_order(type_order: TypeOrder) -> Self {
        Self {
            type_order: Some(type_order),
        }
    }

    pub fn from_override(type_order: Option<TypeOrder>) -> Self {
        Self { type_order }
    }

    pub fn compare(&self, a: &Event, b: &Event) -> Ordering {
        a.time
            .cmp(&b.time)
            .then_with(|| match &self.type_order {
                Some(order) => order.compare(&a.kind, &b.kind),
                None => Ordering::Equal,
            })
            .then_with(|| a.producer.cmp(&b.producer))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
            .then_with(|| a.kind.cmp(&b.kind))
    }
}
