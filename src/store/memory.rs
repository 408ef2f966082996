//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的快照存储实现。

use super::SnapshotStore;
use crate::error::Result;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// 内存快照存储
///
/// 只追加，不做保留或压缩。适用于开发环境和测试。
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: RwLock<Vec<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用已有快照初始化存储
    pub fn with_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self {
            snapshots: RwLock::new(snapshots),
        }
    }

    /// 已存储的快照数量
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }

    /// 按写入顺序返回全部快照
    pub async fn all(&self) -> Vec<Snapshot> {
        self.snapshots.read().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn latest(&self) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        // max_by_key 在相等时返回最后一个，即最近写入的快照
        Ok(snapshots.iter().max_by_key(|s| s.captured_at).cloned())
    }

    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}
