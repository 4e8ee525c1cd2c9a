//! 仿真核心值类型
//!
//! 此模块包含仿真时间、时间窗口、事件以及事件的规范顺序。

// 子模块声明
mod event;
mod ordering;
mod time;

// 重新导出公共接口
pub use event::{Event, EventKey, EventType, Magnitude, NodeId};
pub use ordering::{EventOrdering, TypeOrder};
pub use time::{SimTime, Window};
