//! 计数 sink
//!
//! 按类型统计收到的事件，并保留完整的事件序列供检查。

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::SimError;
use crate::node::{Configuration, EventFilter, Node, SinkNode, SinkView};
use crate::sim::{Event, EventType, NodeId, SimTime};

#[derive(Debug, Clone)]
pub struct Counter {
    id: NodeId,
    filter: EventFilter,
    counts: BTreeMap<EventType, u64>,
    seen: Vec<Event>,
    calls: u64,
}

impl Counter {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            filter: EventFilter::All,
            counts: BTreeMap::new(),
            seen: Vec::new(),
            calls: 0,
        }
    }

    /// 只订阅给定类型
    pub fn only<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.filter = EventFilter::types(types);
        self
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(&EventType::new(kind)).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<EventType, u64> {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn seen(&self) -> &[Event] {
        &self.seen
    }

    /// `consume` 被调用的次数
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Node for Counter {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn accepts(&self) -> EventFilter {
        self.filter.clone()
    }

    fn configuration(&self) -> Configuration {
        let mut config = Configuration::from([("kind".to_string(), "counter".to_string())]);
        if let EventFilter::Types(types) = &self.filter {
            let types = types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(",");
            config.insert("types".to_string(), types);
        }
        config
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl SinkNode for Counter {
    fn consume(&mut self, _window_end: SimTime, view: &mut SinkView<'_>) -> Result<(), SimError> {
        self.calls += 1;
        for ev in view.events() {
            *self.counts.entry(ev.kind.clone()).or_insert(0) += 1;
            self.seen.push(ev.clone());
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn SinkNode> {
        Box::new(self.clone())
    }
}
