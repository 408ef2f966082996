//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了刷新协调系统的错误类型和处理机制。

use thiserror::Error;

/// 刷新协调系统错误类型枚举
///
/// 协调器只会把 `FetchFailed` 暴露给请求方（无缓存时的同步回源失败），
/// 其余错误都在本地吸收并降级处理。
#[derive(Error, Debug)]
pub enum FreshError {
    /// 快照存储不可达或查询失败
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// 上游数据源拉取失败
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// 快照写入存储失败
    #[error("Persist failed: {0}")]
    PersistFailed(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl FreshError {
    /// 归一化为存储读取错误
    pub(crate) fn into_store_unavailable(self) -> Self {
        match self {
            FreshError::StoreUnavailable(_) => self,
            other => FreshError::StoreUnavailable(other.to_string()),
        }
    }

    /// 归一化为存储写入错误
    pub(crate) fn into_persist_failed(self) -> Self {
        match self {
            FreshError::PersistFailed(_) => self,
            FreshError::StoreUnavailable(msg) => FreshError::PersistFailed(msg),
            other => FreshError::PersistFailed(other.to_string()),
        }
    }

    /// 归一化为数据源拉取错误
    pub(crate) fn into_fetch_failed(self) -> Self {
        match self {
            FreshError::FetchFailed(_) => self,
            other => FreshError::FetchFailed(other.to_string()),
        }
    }
}

/// 操作结果类型别名
pub type Result<T> = std::result::Result<T, FreshError>;
