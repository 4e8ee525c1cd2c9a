//! 场景文件
//!
//! 用 JSON 描述一张演示节点图：节点列表、订阅关系、窗口大小与终止时间。
//! 解析后可以直接生成引擎，并在运行结束后汇总每个节点的统计。

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::demo::{AnyGate, Counter, FailureSource, Requester, ResourcePool};
use crate::engine::{Engine, GraphBuilder};
use crate::error::{SimError, UsageError};
use crate::sim::{NodeId, SimTime};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported schema_version {0}")]
    Schema(u32),

    #[error("invalid scenario: {0}")]
    Invalid(String),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Sim(#[from] SimError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    #[serde(default)]
    pub meta: Option<ScenarioMeta>,
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    /// 每次 `evaluate` 推进的 tick 数
    pub window: i64,
    /// 运行到这个时刻为止
    pub until: i64,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKindSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKindSpec {
    FailureSource {
        up: i64,
        down: i64,
        #[serde(default)]
        offset: Option<i64>,
    },
    Requester {
        at: Vec<i64>,
        hold: i64,
    },
    ResourcePool {
        capacity: u32,
    },
    AnyGate {},
    Counter {
        #[serde(default)]
        types: Option<Vec<String>>,
    },
}

/// `to` 订阅 `from`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    pub from: String,
    pub to: String,
}

impl ScenarioSpec {
    pub fn from_json(raw: &str) -> Result<Self, ScenarioError> {
        let spec: ScenarioSpec = serde_json::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ScenarioError::Schema(self.schema_version));
        }
        if self.window <= 0 {
            return Err(ScenarioError::Invalid("window must be positive".into()));
        }
        if self.until <= 0 {
            return Err(ScenarioError::Invalid("until must be positive".into()));
        }
        Ok(())
    }

    /// 依次推进的窗口终点：`window, 2*window, ..., until`（最后一个窗口可能较短）
    pub fn window_targets(&self) -> WindowTargets {
        WindowTargets {
            next: 0,
            step: self.window.max(1),
            until: self.until,
        }
    }

    /// 把场景翻译成构图器（未生成引擎，调用方还可以追加观察者）
    pub fn builder(&self) -> Result<GraphBuilder, ScenarioError> {
        let mut g = GraphBuilder::new().with_config(self.engine.clone().unwrap_or_default());
        for node in &self.nodes {
            let id = NodeId::new(&node.id);
            match &node.kind {
                NodeKindSpec::FailureSource { up, down, offset } => {
                    let source = FailureSource::new(id, *up, *down).with_offset(offset.unwrap_or(0));
                    g.add_evaluator(Box::new(source))?;
                }
                NodeKindSpec::Requester { at, hold } => {
                    let requester = Requester::new(id, at.iter().copied(), *hold);
                    g.add_evaluator(Box::new(requester))?;
                }
                NodeKindSpec::ResourcePool { capacity } => {
                    g.add_responder(Box::new(ResourcePool::new(id, *capacity)))?;
                }
                NodeKindSpec::AnyGate {} => {
                    g.add_evaluator(Box::new(AnyGate::new(id)))?;
                }
                NodeKindSpec::Counter { types } => {
                    let mut counter = Counter::new(id);
                    if let Some(types) = types {
                        counter = counter.only(types.iter().map(String::as_str));
                    }
                    g.add_sink(Box::new(counter))?;
                }
            }
        }
        for sub in &self.subscriptions {
            g.subscribe(&NodeId::new(&sub.from), &NodeId::new(&sub.to))?;
        }
        Ok(g)
    }

    pub fn build(&self) -> Result<Engine, ScenarioError> {
        Ok(self.builder()?.build()?)
    }
}

/// 窗口终点迭代器
#[derive(Debug, Clone)]
pub struct WindowTargets {
    next: i64,
    step: i64,
    until: i64,
}

impl Iterator for WindowTargets {
    type Item = SimTime;

    fn next(&mut self) -> Option<SimTime> {
        if self.next >= self.until {
            return None;
        }
        self.next = self.next.saturating_add(self.step).min(self.until);
        Some(SimTime(self.next))
    }
}

/// 单个节点运行后的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub kind: String,
    pub stats: Vec<(String, String)>,
}

impl NodeSummary {
    pub fn line(&self) -> String {
        let stats = self
            .stats
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("node id={} kind={} {}", self.id, self.kind, stats)
    }
}

/// 按场景里的节点顺序读取每个节点的统计
pub fn summarize(spec: &ScenarioSpec, engine: &Engine) -> Vec<NodeSummary> {
    spec.nodes
        .iter()
        .filter_map(|node| {
            let id = NodeId::new(&node.id);
            let stats = match &node.kind {
                NodeKindSpec::FailureSource { .. } => engine.with_node(&id, |n: &FailureSource| {
                    vec![
                        ("failures".to_string(), n.failures().to_string()),
                        ("failed".to_string(), n.is_failed().to_string()),
                    ]
                }),
                NodeKindSpec::Requester { .. } => engine.with_node(&id, |n: &Requester| {
                    vec![
                        ("requests".to_string(), n.requested_at().len().to_string()),
                        ("grants".to_string(), n.granted_at().len().to_string()),
                    ]
                }),
                NodeKindSpec::ResourcePool { .. } => engine.with_node(&id, |n: &ResourcePool| {
                    vec![
                        ("grants".to_string(), n.grants().len().to_string()),
                        ("in_use".to_string(), n.in_use().to_string()),
                        ("waiting".to_string(), n.waiting().to_string()),
                        ("max_waiting".to_string(), n.max_waiting().to_string()),
                    ]
                }),
                NodeKindSpec::AnyGate {} => engine.with_node(&id, |n: &AnyGate| {
                    vec![
                        ("trips".to_string(), n.trips().to_string()),
                        ("failed".to_string(), n.is_failed().to_string()),
                    ]
                }),
                NodeKindSpec::Counter { .. } => engine.with_node(&id, |n: &Counter| {
                    let mut stats = vec![("total".to_string(), n.total().to_string())];
                    stats.extend(
                        n.counts()
                            .iter()
                            .map(|(k, v)| (format!("count.{k}"), v.to_string())),
                    );
                    stats
                }),
            }?;
            Some(NodeSummary {
                id: node.id.clone(),
                kind: kind_name(&node.kind).to_string(),
                stats,
            })
        })
        .collect()
}

fn kind_name(kind: &NodeKindSpec) -> &'static str {
    match kind {
        NodeKindSpec::FailureSource { .. } => "failure_source",
        NodeKindSpec::Requester { .. } => "requester",
        NodeKindSpec::ResourcePool { .. } => "resource_pool",
        NodeKindSpec::AnyGate {} => "any_gate",
        NodeKindSpec::Counter { .. } => "counter",
    }
}
