//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 连接字符串规范化模块
//!
//! 提供数据库连接字符串的解析、规范化和表名校验功能。
//! 支持 SQLite、MySQL 和 PostgreSQL 三种数据库类型。

use crate::error::{FreshError, Result};
use std::path::Path;

/// 数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    SQLite,
    MySQL,
    PostgreSQL,
}

impl DbType {
    /// 从连接字符串推断数据库类型
    pub fn from_connection_string(s: &str) -> Self {
        let lower = s.to_lowercase();
        if lower.starts_with("mysql") {
            DbType::MySQL
        } else if lower.starts_with("postgres") {
            DbType::PostgreSQL
        } else {
            DbType::SQLite
        }
    }
}

/// 连接字符串解析结果
#[derive(Debug, Clone)]
pub struct ParsedConnectionString<'a> {
    /// 数据库类型
    pub db_type: DbType,
    /// 原始连接字符串
    pub original: &'a str,
    /// SQLite 文件路径
    pub file_path: Option<String>,
    /// 是否为内存数据库
    pub is_memory: bool,
    /// 连接参数
    pub params: Vec<(String, String)>,
}

impl<'a> ParsedConnectionString<'a> {
    pub fn parse(s: &'a str) -> Self {
        match DbType::from_connection_string(s) {
            DbType::SQLite => Self::parse_sqlite(s),
            db_type => Self {
                db_type,
                original: s,
                file_path: None,
                is_memory: false,
                params: s
                    .split_once('?')
                    .map(|(_, query)| extract_params(query))
                    .unwrap_or_default(),
            },
        }
    }

    fn parse_sqlite(s: &'a str) -> Self {
        let is_memory = s.contains(":memory:");
        let rest = s.strip_prefix("sqlite:").unwrap_or(s);
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };

        let file_path = if is_memory {
            None
        } else if let Some(rest) = path.strip_prefix("//") {
            // sqlite:///abs 为绝对路径，sqlite://rel 为相对路径
            if rest.starts_with('/') {
                Some(rest.to_string())
            } else {
                Some(format!("./{}", rest))
            }
        } else if path.starts_with('/') || path.starts_with("./") || path.starts_with("../") {
            Some(path.to_string())
        } else {
            Some(format!("./{}", path))
        };

        Self {
            db_type: DbType::SQLite,
            original: s,
            file_path,
            is_memory,
            params: extract_params(query),
        }
    }
}

fn extract_params(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

/// 规范化连接字符串
///
/// SQLite 相对路径统一为 `sqlite:./path`，并补全 `mode=rwc` 以便首次运行时建库；
/// 内存数据库统一为 `sqlite::memory:`。MySQL 和 PostgreSQL 原样返回。
pub fn normalize_connection_string(s: &str) -> String {
    let parsed = ParsedConnectionString::parse(s);
    if parsed.db_type != DbType::SQLite {
        return s.to_string();
    }

    let mut params = parsed.params.clone();
    let base = match &parsed.file_path {
        None => "sqlite::memory:".to_string(),
        Some(path) => {
            if !params.iter().any(|(k, _)| k == "mode") {
                params.push(("mode".to_string(), "rwc".to_string()));
            }
            format!("sqlite:{}", path)
        }
    };

    if params.is_empty() {
        base
    } else {
        let params: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}?{}", base, params.join("&"))
    }
}

/// 确保 SQLite 数据库目录存在
///
/// # 返回
///
/// 规范化后的连接字符串
pub fn ensure_database_directory(connection_string: &str) -> Result<String> {
    let parsed = ParsedConnectionString::parse(connection_string);

    if let (DbType::SQLite, Some(path)) = (parsed.db_type, &parsed.file_path) {
        let full_path = if path.starts_with('/') {
            Path::new(path).to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if let Some(parent) = full_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FreshError::StoreUnavailable(format!(
                        "无法创建数据库目录 {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
    }

    Ok(normalize_connection_string(connection_string))
}

/// 验证SQL标识符是否安全（防止SQL注入）
///
/// 只能包含字母、数字、下划线，且不能以数字开头
pub fn validate_identifier(identifier: &str) -> std::result::Result<(), String> {
    if identifier.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if identifier.len() > 64 {
        return Err(format!(
            "Identifier '{}' exceeds maximum length of 64 characters",
            identifier
        ));
    }

    let mut chars = identifier.chars();
    let first = chars.next().unwrap_or('0');
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "Invalid identifier '{}': must start with a letter or underscore",
            identifier
        ));
    }

    if chars.any(|c| !c.is_ascii_alphanumeric() && c != '_') {
        return Err(format!(
            "Invalid identifier '{}': only alphanumeric characters and underscores are allowed",
            identifier
        ));
    }

    Ok(())
}
