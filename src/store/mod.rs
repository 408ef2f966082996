//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 快照存储模块
//!
//! 定义快照存储接口，并提供内存和数据库两种实现。

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::sync::Arc;

pub mod connection_string;
pub mod database;
pub mod memory;

pub use database::DatabaseStore;
pub use memory::MemoryStore;

/// 快照存储trait
///
/// 按 `captured_at` 查询最新快照，且只支持追加写入。
/// 所有方法都可能失败，调用方必须自行降级。
#[async_trait]
pub trait SnapshotStore: Send + Sync + std::fmt::Debug {
    /// 获取最新快照
    ///
    /// # 返回值
    ///
    /// 存储为空时返回 None，存储不可达时返回 `StoreUnavailable`
    async fn latest(&self) -> Result<Option<Snapshot>>;

    /// 追加写入快照
    async fn append(&self, snapshot: &Snapshot) -> Result<()>;

    /// 存储连接是否已建立
    fn is_available(&self) -> bool;
}

/// 根据配置创建快照存储
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn SnapshotStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Database => Ok(Arc::new(DatabaseStore::new(config)?)),
    }
}
