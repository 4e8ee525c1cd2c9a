//! 回调时间最小堆
//!
//! 1 起始下标的二叉最小堆。出队时合并所有相同的最小值，
//! 因此重复登记“在 T 时刻唤醒我”是幂等的。

use crate::sim::SimTime;

#[derive(Debug, Clone)]
pub struct TimeHeap {
    // slots[0] 不使用
    slots: Vec<SimTime>,
}

impl Default for TimeHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeHeap {
    pub fn new() -> Self {
        Self {
            slots: vec![SimTime::NEVER],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, t: SimTime) {
        self.slots.push(t);
        self.sift_up(self.len());
    }

    pub fn peek(&self) -> Option<SimTime> {
        self.slots.get(1).copied()
    }

    /// 弹出最小时间，并丢弃与之相等的所有重复项
    pub fn pop(&mut self) -> Option<SimTime> {
        let min = self.pop_one()?;
        while self.peek() == Some(min) {
            self.pop_one();
        }
        Some(min)
    }

    fn pop_one(&mut self) -> Option<SimTime> {
        if self.is_empty() {
            return None;
        }
        let last = self.len();
        self.slots.swap(1, last);
        let min = self.slots.pop();
        if !self.is_empty() {
            self.sift_down(1);
        }
        min
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 1 {
            let parent = i / 2;
            if self.slots[i] >= self.slots[parent] {
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
            let child = if right <= n && self.slots[right] < self.slots[left] {
                right
            } else {
                left
            };
            if self.slots[child] >= self.slots[i] {
                break;
            }
            self.slots.swap(i, child);
            i = child;
        }
    }
}
