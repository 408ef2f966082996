//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 sea-orm 的快照存储实现，支持 SQLite、PostgreSQL 和 MySQL。

use super::connection_string::{
    ensure_database_directory, validate_identifier, DbType, ParsedConnectionString,
};
use super::SnapshotStore;
use crate::config::StoreConfig;
use crate::error::{FreshError, Result};
use crate::snapshot::{Item, Snapshot};
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
    Value,
};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// 数据库快照存储
///
/// 连接在首次使用时建立，失败后下次调用会重新尝试。
pub struct DatabaseStore {
    /// 规范化后的连接字符串
    connection_string: String,
    /// 数据库类型
    db_type: DbType,
    /// 快照表名
    table_name: String,
    /// 连接超时时间（毫秒）
    connect_timeout_ms: u64,
    /// 已建立的连接
    connection: OnceCell<DatabaseConnection>,
}

impl std::fmt::Debug for DatabaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseStore")
            .field(
                "connection_string",
                &redact_connection_string(&self.connection_string),
            )
            .field("db_type", &self.db_type)
            .field("table_name", &self.table_name)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

impl DatabaseStore {
    /// 创建数据库快照存储（不立即连接）
    pub fn new(config: &StoreConfig) -> Result<Self> {
        validate_identifier(&config.table_name).map_err(FreshError::ConfigError)?;

        let raw = config
            .connection_string
            .as_ref()
            .map(|s| s.expose_secret().to_string())
            .ok_or_else(|| {
                FreshError::ConfigError("database store requires a connection_string".to_string())
            })?;
        let connection_string = ensure_database_directory(&raw)?;

        Ok(Self {
            db_type: DbType::from_connection_string(&connection_string),
            connection_string,
            table_name: config.table_name.clone(),
            connect_timeout_ms: config.connect_timeout_ms,
            connection: OnceCell::new(),
        })
    }

    /// 建立连接并初始化快照表
    pub async fn connect(&self) -> Result<&DatabaseConnection> {
        self.connection
            .get_or_try_init(|| self.open_connection())
            .await
    }

    async fn open_connection(&self) -> Result<DatabaseConnection> {
        let redacted = redact_connection_string(&self.connection_string);
        info!("Connecting snapshot store: {}", redacted);

        let timeout = Duration::from_millis(self.connect_timeout_ms);
        let opt = self.connect_options();

        let connection = match tokio::time::timeout(timeout, Database::connect(opt)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                warn!("Snapshot store connection to {} failed: {}", redacted, e);
                return Err(FreshError::StoreUnavailable(format!(
                    "Failed to open database: {}",
                    e
                )));
            }
            Err(_) => {
                warn!(
                    "Snapshot store connection to {} timed out after {}ms",
                    redacted, self.connect_timeout_ms
                );
                return Err(FreshError::StoreUnavailable(format!(
                    "Connection timed out after {}ms",
                    self.connect_timeout_ms
                )));
            }
        };

        for sql in self.schema_statements() {
            debug!("Initializing snapshot table with SQL: {}", sql);
            connection
                .execute(Statement::from_string(connection.get_database_backend(), sql))
                .await
                .map_err(|e| {
                    FreshError::StoreUnavailable(format!("Schema initialization failed: {}", e))
                })?;
        }

        Ok(connection)
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.connection_string.clone());
        opt.max_connections(if self.db_type == DbType::SQLite { 1 } else { 5 })
            .min_connections(1)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .sqlx_logging(false);
        if is_memory_database(&self.connection_string) {
            // 内存库随连接销毁，唯一的连接不能被连接池回收
            opt.max_lifetime(MEMORY_CONNECTION_LIFETIME)
                .idle_timeout(MEMORY_CONNECTION_LIFETIME);
        }
        opt
    }

    fn quoted_table(&self) -> String {
        match self.db_type {
            DbType::MySQL => format!("`{}`", self.table_name),
            _ => format!("\"{}\"", self.table_name),
        }
    }

    fn schema_statements(&self) -> Vec<String> {
        let table = self.quoted_table();
        match self.db_type {
            DbType::SQLite => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, captured_at TEXT NOT NULL, items TEXT NOT NULL)",
                    table
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS \"{}_captured_at_idx\" ON {} (captured_at)",
                    self.table_name, table
                ),
            ],
            DbType::PostgreSQL => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id BIGSERIAL PRIMARY KEY, captured_at VARCHAR(40) NOT NULL, items TEXT NOT NULL)",
                    table
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS \"{}_captured_at_idx\" ON {} (captured_at)",
                    self.table_name, table
                ),
            ],
            DbType::MySQL => vec![format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGINT AUTO_INCREMENT PRIMARY KEY, captured_at VARCHAR(40) NOT NULL, items LONGTEXT NOT NULL, INDEX `{}_captured_at_idx` (captured_at))",
                table, self.table_name
            )],
        }
    }

    fn insert_sql(&self, backend: DatabaseBackend) -> String {
        let table = self.quoted_table();
        match backend {
            DatabaseBackend::Postgres => {
                format!("INSERT INTO {} (captured_at, items) VALUES ($1, $2)", table)
            }
            _ => format!("INSERT INTO {} (captured_at, items) VALUES (?, ?)", table),
        }
    }
}

/// 内存库连接的存活与空闲上限（约一年）
const MEMORY_CONNECTION_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 365);

fn is_memory_database(connection_string: &str) -> bool {
    ParsedConnectionString::parse(connection_string).is_memory
}

/// 固定微秒精度的 RFC3339，保证字典序与时间序一致
fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FreshError::StoreUnavailable(format!("Invalid captured_at '{}': {}", raw, e)))
}

#[async_trait]
impl SnapshotStore for DatabaseStore {
    #[instrument(skip(self), level = "debug")]
    async fn latest(&self) -> Result<Option<Snapshot>> {
        let conn = self.connect().await?;
        let sql = format!(
            "SELECT captured_at, items FROM {} ORDER BY captured_at DESC, id DESC LIMIT 1",
            self.quoted_table()
        );

        let row = conn
            .query_one(Statement::from_string(conn.get_database_backend(), sql))
            .await
            .map_err(|e| FreshError::StoreUnavailable(format!("SQL query failed: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let captured_at: String = row
            .try_get("", "captured_at")
            .map_err(|e| FreshError::StoreUnavailable(format!("Malformed row: {}", e)))?;
        let items: String = row
            .try_get("", "items")
            .map_err(|e| FreshError::StoreUnavailable(format!("Malformed row: {}", e)))?;
        let items: Vec<Item> = serde_json::from_str(&items)?;

        Ok(Some(Snapshot::captured_at(
            decode_timestamp(&captured_at)?,
            items,
        )))
    }

    #[instrument(skip(self, snapshot), level = "debug", fields(items = snapshot.len()))]
    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        let conn = self.connect().await?;
        let backend = conn.get_database_backend();
        let items = serde_json::to_string(&snapshot.items)?;

        conn.execute(Statement::from_sql_and_values(
            backend,
            self.insert_sql(backend),
            [
                Value::from(encode_timestamp(&snapshot.captured_at)),
                Value::from(items),
            ],
        ))
        .await
        .map_err(|e| FreshError::PersistFailed(format!("SQL insert failed: {}", e)))?;

        Ok(())
    }

    fn is_available(&self) -> bool {
        self.connection.initialized()
    }
}
