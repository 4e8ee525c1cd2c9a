//! 仿真时间类型
//!
//! 定义仿真时钟（整数 tick）以及一次推进所覆盖的时间窗口。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 仿真时间（整数 tick）。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(pub i64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    /// 用作“无穷远”的哨兵值（没有待触发回调时使用）
    pub const NEVER: SimTime = SimTime(i64::MAX);

    pub fn ticks(self) -> i64 {
        self.0
    }

    pub fn saturating_add(self, ticks: i64) -> SimTime {
        SimTime(self.0.saturating_add(ticks))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == SimTime::NEVER {
            f.write_str("∞")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// 一次 `evaluate` 处理的左开右闭时间窗口 `(start, end]`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: SimTime,
    pub end: SimTime,
}

impl Window {
    pub fn new(start: SimTime, end: SimTime) -> Self {
        Self { start, end }
    }

    /// 时间点是否落在窗口内（不含起点，含终点）
    pub fn contains(&self, t: SimTime) -> bool {
        self.start < t && t <= self.end
    }

    pub fn len(&self) -> i64 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}
