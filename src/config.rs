//! 引擎配置

use serde::{Deserialize, Serialize};

use crate::node::runtime::DEFAULT_HISTORY_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 线程池大小；0 表示使用 rayon 默认值（CPU 核数）
    pub threads: usize,
    /// 每个节点保留的诊断尾部记录条数
    pub history_len: usize,
    pub thread_name_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            history_len: DEFAULT_HISTORY_LEN,
            thread_name_prefix: "rasim-worker".to_string(),
        }
    }
}
