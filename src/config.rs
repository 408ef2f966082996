//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了服务的配置结构和解析逻辑。

use crate::error::{FreshError, Result};
use crate::store::connection_string::validate_identifier;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP服务配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_addr: String,
    /// 服务名称，用于日志和指标标签
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            service_name: "catalog".to_string(),
        }
    }
}

/// 快照存储后端类型
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储
    #[default]
    Memory,
    /// sea-orm 数据库存储
    Database,
}

/// 快照存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StoreConfig {
    /// 存储后端
    pub backend: StoreBackend,
    /// 数据库连接字符串（使用 SecretString 保护）
    pub connection_string: Option<SecretString>,
    /// 连接超时时间（毫秒）
    pub connect_timeout_ms: u64,
    /// 快照表名
    pub table_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            connection_string: None,
            connect_timeout_ms: 5000,
            table_name: "snapshots".to_string(),
        }
    }
}

impl StoreConfig {
    /// SQLite 内存数据库配置，主要用于测试
    pub fn sqlite_memory() -> Self {
        Self {
            backend: StoreBackend::Database,
            connection_string: Some(SecretString::new("sqlite::memory:".to_string().into())),
            ..Default::default()
        }
    }
}

/// 上游数据源配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SourceConfig {
    /// 上游条目列表地址
    pub url: String,
    /// 请求超时时间（毫秒）
    pub timeout_ms: u64,
    /// 请求使用的 User-Agent
    pub user_agent: Option<String>,
    /// 派生值计算，未配置时条目原样透传
    pub derive: Option<DeriveConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: 30_000,
            user_agent: None,
            derive: None,
        }
    }
}

/// 派生值配置
///
/// 对每个条目计算 `numerator / denominator` 并写入 `field`
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct DeriveConfig {
    pub field: String,
    pub numerator: String,
    pub denominator: String,
}

/// 刷新协调配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RefreshConfig {
    /// 同步回源是否参与单飞守卫
    pub coalesce_fallback: bool,
    /// 关闭时等待后台刷新完成的时间（毫秒）
    pub shutdown_grace_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            coalesce_fallback: true,
            shutdown_grace_ms: 5000,
        }
    }
}

/// 日志配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter 过滤表达式，RUST_LOG 优先
    pub filter: String,
    /// 是否输出JSON格式日志
    pub json: bool,
    /// 是否启用 OpenTelemetry 链路追踪层
    pub opentelemetry: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
            opentelemetry: false,
        }
    }
}

impl Config {
    /// 从TOML文件加载并验证配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FreshError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// 从TOML字符串解析并验证配置
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| FreshError::ConfigError(e.to_string()))?;
        config.validate().map_err(FreshError::ConfigError)?;
        Ok(config)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.server.service_name.is_empty() {
            return Err("Service name cannot be empty".to_string());
        }

        if self.server.service_name.len() > 64 {
            return Err(format!(
                "Service name '{}' exceeds maximum length of 64 characters",
                self.server.service_name
            ));
        }

        if self.server.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address '{}'",
                self.server.bind_addr
            ));
        }

        if self.store.backend == StoreBackend::Database {
            match &self.store.connection_string {
                Some(conn) if !conn.expose_secret().trim().is_empty() => {}
                _ => {
                    return Err(
                        "store.connection_string is required for the database backend"
                            .to_string(),
                    )
                }
            }
        }

        validate_identifier(&self.store.table_name)?;

        if self.store.connect_timeout_ms == 0 {
            return Err("store.connect_timeout_ms cannot be zero".to_string());
        }

        if !(self.source.url.starts_with("http://") || self.source.url.starts_with("https://")) {
            return Err(format!(
                "source.url must be an http(s) URL, got '{}'",
                self.source.url
            ));
        }

        if self.source.timeout_ms == 0 {
            return Err("source.timeout_ms cannot be zero".to_string());
        }

        if let Some(derive) = &self.source.derive {
            if [&derive.field, &derive.numerator, &derive.denominator]
                .iter()
                .any(|name| name.trim().is_empty())
            {
                return Err("source.derive field names cannot be empty".to_string());
            }
        }

        Ok(())
    }
}
