//! 构图
//!
//! 注册节点、连接订阅关系，最后一次性生成引擎。拓扑在 `build` 之后不可变。
//! 构图阶段的错误都是用法错误，构图器本身仍然可用。

use std::collections::HashMap;

use tracing::{debug, info};

use super::coordinator::{Engine, Shared};
use super::entry::{Entry, EntryKind, Role};
use super::observer::Observer;
use crate::config::EngineConfig;
use crate::error::{SimError, UsageError};
use crate::node::{EvaluatorNode, InitInfo, ResponderNode, SinkNode};
use crate::sim::{NodeId, SimTime};

#[derive(Default)]
pub struct GraphBuilder {
    config: EngineConfig,
    roles: Vec<Role>,
    index: HashMap<NodeId, usize>,
    deps: Vec<Vec<usize>>,
    subscribers: Vec<Vec<usize>>,
    observers: Vec<Box<dyn Observer>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn add_sink(&mut self, node: Box<dyn SinkNode>) -> Result<NodeId, UsageError> {
        self.register(Role::Sink(node))
    }

    pub fn add_responder(&mut self, node: Box<dyn ResponderNode>) -> Result<NodeId, UsageError> {
        self.register(Role::Responder(node))
    }

    pub fn add_evaluator(&mut self, node: Box<dyn EvaluatorNode>) -> Result<NodeId, UsageError> {
        self.register(Role::Evaluator(node))
    }

    fn register(&mut self, role: Role) -> Result<NodeId, UsageError> {
        let id = role.id().clone();
        if !id.is_well_formed() {
            return Err(UsageError::MalformedId(id.to_string()));
        }
        if self.index.contains_key(&id) {
            return Err(UsageError::DuplicateId(id));
        }
        let idx = self.roles.len();
        debug!(node = %id, kind = role.kind().name(), idx, "注册节点");
        self.index.insert(id.clone(), idx);
        self.roles.push(role);
        self.deps.push(Vec::new());
        self.subscribers.push(Vec::new());
        Ok(id)
    }

    /// `consumer` 订阅 `producer` 的事件（`producer` 必须是 evaluator）。重复订阅被忽略。
    pub fn subscribe(&mut self, producer: &NodeId, consumer: &NodeId) -> Result<(), UsageError> {
        let from = self.idx(producer)?;
        let to = self.idx(consumer)?;
        if from == to {
            return Err(UsageError::SelfSubscription(producer.clone()));
        }
        let kind = self.roles[from].kind();
        if kind != EntryKind::Evaluator {
            return Err(UsageError::RoleMismatch {
                node: producer.clone(),
                expected: EntryKind::Evaluator.name(),
                actual: kind.name(),
            });
        }
        if self.subscribers[from].contains(&to) {
            return Ok(());
        }
        self.subscribers[from].push(to);
        self.deps[to].push(from);
        Ok(())
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    fn idx(&self, id: &NodeId) -> Result<usize, UsageError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| UsageError::UnknownId(id.clone()))
    }

    /// 调用每个 evaluator 的 `initiate`，然后生成引擎
    pub fn build(self) -> Result<Engine, SimError> {
        let GraphBuilder {
            config,
            mut roles,
            index: _,
            deps,
            subscribers,
            observers,
        } = self;

        let ids: Vec<NodeId> = roles.iter().map(|r| r.id().clone()).collect();
        let names = |idxs: &[usize]| idxs.iter().map(|&i| ids[i].clone()).collect::<Vec<_>>();
        for (idx, role) in roles.iter_mut().enumerate() {
            if let Role::Evaluator(node) = role {
                let info = InitInfo {
                    id: ids[idx].clone(),
                    dependencies: names(&deps[idx]),
                    subscribers: names(&subscribers[idx]),
                    history_len: config.history_len,
                };
                node.initiate(&info)?;
            }
        }

        let entries: Vec<Entry> = roles
            .into_iter()
            .zip(deps)
            .zip(subscribers)
            .enumerate()
            .map(|(idx, ((role, deps), subs))| Entry::new(idx, role, deps, subs))
            .collect();
        info!(
            nodes = entries.len(),
            observers = observers.len(),
            threads = config.threads,
            "🏗️  构图完成"
        );
        Engine::new(Shared::new(entries, observers), config, SimTime::ZERO)
    }
}
