//! 事件最小堆
//!
//! 比较器驱动的 1 起始下标二叉最小堆。既用作节点的延后事件缓冲，
//! 也用作订阅者的入站缓冲；排空时按比较器顺序输出。

use std::cmp::Ordering;

use crate::sim::{Event, EventOrdering};

#[derive(Debug, Clone)]
pub struct EventHeap {
    order: EventOrdering,
    // slots[0] 不使用
    slots: Vec<Option<Event>>,
}

impl Default for EventHeap {
    fn default() -> Self {
        Self::new(EventOrdering::canonical())
    }
}

impl EventHeap {
    pub fn new(order: EventOrdering) -> Self {
        Self {
            order,
            slots: vec![None],
        }
    }

    pub fn ordering(&self) -> &EventOrdering {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, ev: Event) {
        self.slots.push(Some(ev));
        self.sift_up(self.len());
    }

    pub fn peek(&self) -> Option<&Event> {
        self.slots.get(1).and_then(Option::as_ref)
    }

    pub fn pop(&mut self) -> Option<Event> {
        if self.is_empty() {
            return None;
        }
        let last = self.len();
        self.slots.swap(1, last);
        let min = self.slots.pop().flatten();
        if !self.is_empty() {
            self.sift_down(1);
        }
        min
    }

    /// 按顺序取出全部事件，堆被清空
    pub fn drain_sorted(&mut self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(ev) = self.pop() {
            out.push(ev);
        }
        out
    }

    pub fn clear(&mut self) {
        self.slots.truncate(1);
    }

    fn less(&self, a: usize, b: usize) -> bool {
        match (&self.slots[a], &self.slots[b]) {
            (Some(x), Some(y)) => self.order.compare(x, y) == Ordering::Less,
            _ => false,
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 1 {
            let parent = i / 2;
            if !self.less(i, parent) {
                break;
            }
            self.slots.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.len();
        loop {
            let left = i * 2;
            if left > n {
                break;
            }
            let right = left + 1;
            let child = if right <= n && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, i) {
                break;
            }
            self.slots.swap(i, child);
            i = child;
        }
    }
}

impl Extend<Event> for EventHeap {
    fn extend<T: IntoIterator<Item = Event>>(&mut self, iter: T) {
        for ev in iter {
            self.push(ev);
        }
    }
}
