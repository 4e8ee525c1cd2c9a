//! 有序队列
//!
//! 运行时循环与调度条目共用的两种最小堆：只按时间排序的回调堆，
//! 以及按规范事件顺序排序的事件堆。两者都可深拷贝，以支持节点复制。

mod event_heap;
mod time_heap;

pub use event_heap::EventHeap;
pub use time_heap::TimeHeap;
