//! 调度/执行内核
//!
//! 此模块包含调度条目、三种窗口执行任务、引擎协调器、构图器与全局观察者。
//! 控制流自上而下：协调器 → 任务 → 条目 → 运行时循环 → 队列；
//! 数据流自下而上：节点产出经由条目、任务进入相邻条目。

// 子模块声明
mod builder;
mod coordinator;
mod entry;
mod observer;
mod task;

// 重新导出公共接口
pub use builder::GraphBuilder;
pub use coordinator::Engine;
pub use entry::EntryKind;
pub use observer::{Observed, Observer, TraceRecord, TraceRecorder, TraceRef};
