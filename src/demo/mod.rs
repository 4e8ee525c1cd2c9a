//! 演示节点
//!
//! 基于内核契约编写的参考客户端节点：周期性失效源、资源请求者、
//! 容量受限的资源池、或门风险传播与计数 sink。场景文件与 CLI 都用它们搭图。

mod counter;
mod gate;
mod pool;
mod requester;
mod source;

pub use counter::Counter;
pub use gate::AnyGate;
pub use pool::ResourcePool;
pub use requester::Requester;
pub use source::FailureSource;

pub const FAIL: &str = "FAIL";
pub const REPAIR: &str = "REPAIR";
pub const REQUEST: &str = "REQUEST";
pub const GRANT: &str = "GRANT";
pub const RETURN: &str = "RETURN";
