//! 容量受限的资源池
//!
//! Responder：按到达顺序分配资源。容量不足的请求排队，收到 RETURN 后按先来先得授予。
//! 只要还有排队请求就保持活跃，使之后到达的 RETURN 能在依赖完成前驱动它。

use std::any::Any;
use std::collections::VecDeque;

use super::{GRANT, REQUEST, RETURN};
use crate::error::SimError;
use crate::node::{
    Behavior, Configuration, Cursor, EventFilter, Node, ResponderNode, ResponderView, Timeline,
};
use crate::sim::{Event, NodeId, SimTime};

#[derive(Debug, Clone)]
pub struct ResourcePool {
    id: NodeId,
    timeline: Timeline,
    alloc: Allocation,
}

#[derive(Debug, Clone)]
struct Allocation {
    capacity: u32,
    in_use: u32,
    waiting: VecDeque<Event>,
    grants: Vec<(NodeId, SimTime)>,
    max_waiting: usize,
}

impl ResourcePool {
    pub fn new(id: impl Into<NodeId>, capacity: u32) -> Self {
        let id = id.into();
        Self {
            timeline: Timeline::new(id.clone()),
            id,
            alloc: Allocation {
                capacity,
                in_use: 0,
                waiting: VecDeque::new(),
                grants: Vec::new(),
                max_waiting: 0,
            },
        }
    }

    /// 授予记录：（请求者，授予时刻）
    pub fn grants(&self) -> &[(NodeId, SimTime)] {
        &self.alloc.grants
    }

    pub fn in_use(&self) -> u32 {
        self.alloc.in_use
    }

    pub fn waiting(&self) -> usize {
        self.alloc.waiting.len()
    }

    pub fn max_waiting(&self) -> usize {
        self.alloc.max_waiting
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}

impl Node for ResourcePool {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn accepts(&self) -> EventFilter {
        EventFilter::types([REQUEST, RETURN])
    }

    fn configuration(&self) -> Configuration {
        Configuration::from([
            ("kind".to_string(), "resource_pool".to_string()),
            ("capacity".to_string(), self.alloc.capacity.to_string()),
        ])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ResponderNode for ResourcePool {
    fn consume(&mut self, _window_end: SimTime, view: &mut ResponderView<'_>) -> Result<(), SimError> {
        let window = view.window();
        let batch = view.events();
        let pass = view.pass();
        self.timeline.advance(window, batch, pass, &mut self.alloc, view)?;
        view.report_next_due(self.timeline.next_due());
        if !self.alloc.waiting.is_empty() {
            view.keep_active();
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn ResponderNode> {
        Box::new(self.clone())
    }
}

impl Allocation {
    fn grant(
        &mut self,
        request: &Event,
        cx: &mut Cursor<'_>,
        view: &mut ResponderView<'_>,
    ) -> Result<(), SimError> {
        let reply = cx.event(GRANT).caused_by(request);
        view.raise_response(reply, request)?;
        self.in_use += 1;
        self.grants.push((request.producer.clone(), cx.now()));
        Ok(())
    }
}

impl<'a> Behavior<ResponderView<'a>> for Allocation {
    fn on_event(
        &mut self,
        event: Option<&Event>,
        cx: &mut Cursor<'_>,
        view: &mut ResponderView<'a>,
    ) -> Result<(), SimError> {
        let Some(ev) = event else {
            return Ok(());
        };
        match ev.kind.as_str() {
            REQUEST if self.in_use < self.capacity => self.grant(ev, cx, view)?,
            REQUEST => {
                self.waiting.push_back(ev.clone());
                self.max_waiting = self.max_waiting.max(self.waiting.len());
            }
            RETURN => {
                self.in_use = self.in_use.saturating_sub(1);
                while self.in_use < self.capacity {
                    let Some(next) = self.waiting.pop_front() else {
                        break;
                    };
                    self.grant(&next, cx, view)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
