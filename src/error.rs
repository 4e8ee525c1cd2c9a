//! 错误类型
//!
//! 用法错误在调用点同步返回，仿真仍然可用；协议违规、结构性死锁与任务失败
//! 都是致命错误，会把协调器标记为已损坏，之后只允许销毁。

use thiserror::Error;

use crate::sim::{EventType, NodeId, SimTime};

/// 调用方传参/构图错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("malformed node id {0:?}")]
    MalformedId(String),

    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),

    #[error("unknown node id {0}")]
    UnknownId(NodeId),

    #[error("node {0} cannot subscribe to itself")]
    SelfSubscription(NodeId),

    #[error("node {node} is a {actual}, expected {expected}")]
    RoleMismatch {
        node: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("reply type {reply} is not permitted by request {request} from {producer}")]
    ReplyTypeNotPermitted {
        producer: NodeId,
        request: EventType,
        reply: EventType,
    },

    #[error("window target {target} must be after committed clock {clock}")]
    NonMonotonicWindow { clock: SimTime, target: SimTime },

    #[error("event time {time} outside open window ({start}, {end}]")]
    OutsideWindow {
        time: SimTime,
        start: SimTime,
        end: SimTime,
    },

    #[error("node {node} raised time {time} before its previous event at {last}")]
    NonMonotonicTime {
        node: NodeId,
        time: SimTime,
        last: SimTime,
    },

    #[error("node {node} raised time {time} before the {floor} it promised downstream")]
    BeforePromise {
        node: NodeId,
        time: SimTime,
        floor: SimTime,
    },

    #[error("node {node} reused ordinal {ordinal}")]
    NonMonotonicOrdinal { node: NodeId, ordinal: u64 },

    #[error("node {node} raised an event carrying producer id {producer}")]
    WrongProducer { node: NodeId, producer: NodeId },

    #[error("wake time {time} is not after the node clock {now}")]
    WakeInPast { time: SimTime, now: SimTime },
}

/// 协议违规：状态已损坏
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("response {reply} from {responder} matches no outstanding request of {target}")]
    UnmatchedResponse {
        responder: NodeId,
        target: NodeId,
        reply: EventType,
    },

    #[error("response {reply} to {target} arrived before its request (ordinal {ordinal}) was registered")]
    ResponseBeforeRequest {
        target: NodeId,
        reply: EventType,
        ordinal: u64,
    },

    #[error("node {node} received an event at {time} behind its processed time {processed}")]
    LateEvent {
        node: NodeId,
        time: SimTime,
        processed: SimTime,
    },

    #[error("node {node} exited cleanly at {processed} without reaching the boundary {boundary}")]
    BoundaryNotReached {
        node: NodeId,
        processed: SimTime,
        boundary: SimTime,
    },
}

/// 任务失败的原因：节点返回的错误，或逃逸出节点逻辑的 panic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("{0}")]
    Error(SimError),

    #[error("panicked: {0}")]
    Panic(String),
}

/// 单个任务捕获到的失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{node}: {cause}")]
pub struct TaskFailure {
    pub node: NodeId,
    pub cause: FailureCause,
}

impl TaskFailure {
    pub fn protocol_violation(&self) -> Option<&ProtocolViolation> {
        match &self.cause {
            FailureCause::Error(SimError::Protocol(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("circular dependency at window end {window_end}: no progress for {pending:?}")]
    CircularDependency {
        window_end: SimTime,
        pending: Vec<NodeId>,
    },

    #[error("{} task(s) failed: {}", .0.len(), join_failures(.0))]
    TaskFailures(Vec<TaskFailure>),

    #[error("node {node} failed: {message}")]
    Node { node: NodeId, message: String },

    #[error("engine is dead after a fatal failure")]
    Dead,

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

impl SimError {
    /// 节点逻辑自身报告的失败
    pub fn node(node: &NodeId, message: impl Into<String>) -> Self {
        SimError::Node {
            node: node.clone(),
            message: message.into(),
        }
    }

    /// 用法错误之外的错误都会令协调器失效
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimError::Usage(_))
    }
}

fn join_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
