//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了快照、条目和来源标记等数据模型。

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// 数据条目
///
/// 由数据源产生并附带派生值的不透明载荷，协调器只做透传。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(pub serde_json::Value);

impl Item {
    /// 使用任意JSON值创建条目
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// 获取条目的原始JSON值
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    /// 获取条目的可变JSON值，供派生值计算写入字段
    pub fn value_mut(&mut self) -> &mut serde_json::Value {
        &mut self.0
    }
}

impl From<serde_json::Value> for Item {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// 快照
///
/// 一次完整条目集合的带时间戳捕获，创建后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// 捕获时间
    pub captured_at: DateTime<Utc>,
    /// 有序条目列表
    pub items: Vec<Item>,
}

impl Snapshot {
    /// 以当前时间创建快照
    ///
    /// 时间戳截断到微秒，与存储层的编码精度一致。
    pub fn new(items: Vec<Item>) -> Self {
        Self::captured_at(Utc::now().trunc_subsecs(6), items)
    }

    /// 以指定时间创建快照
    pub fn captured_at(captured_at: DateTime<Utc>, items: Vec<Item>) -> Self {
        Self { captured_at, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 响应来源标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// 来自存储中的快照
    Cache,
    /// 来自同步实时拉取
    Live,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Cache => "cache",
            Provenance::Live => "live",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
