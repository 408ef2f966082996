//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 上游数据源模块
//!
//! 定义数据源接口与派生值计算的组合方式

use crate::config::{DeriveConfig, SourceConfig};
use crate::error::Result;
use crate::snapshot::Item;
use async_trait::async_trait;
use std::sync::Arc;

pub mod http;

pub use http::HttpSource;

/// 根据配置组装数据源：HTTP 拉取，配置了派生值时再叠加比值计算
pub fn build_source(config: &SourceConfig) -> Result<Arc<dyn DataSource>> {
    let http = HttpSource::new(config)?;
    let source: Arc<dyn DataSource> = match &config.derive {
        Some(derive) => Arc::new(DerivedSource::new(http, RatioDeriver::from(derive))),
        None => Arc::new(http),
    };
    Ok(source)
}

/// 数据源trait
///
/// 一次调用返回当前完整的条目集合，失败时返回 `FetchFailed`
#[async_trait]
pub trait DataSource: Send + Sync + std::fmt::Debug {
    /// 拉取全部条目
    async fn fetch(&self) -> Result<Vec<Item>>;
}

/// 派生值计算trait
///
/// 对每个拉取到的条目计算并写入派生值
pub trait ValueDeriver: Send + Sync {
    fn derive(&self, item: &mut Item);
}

impl<F> ValueDeriver for F
where
    F: Fn(&mut Item) + Send + Sync,
{
    fn derive(&self, item: &mut Item) {
        self(item)
    }
}

/// 比值派生
///
/// 分子、分母都是数字且分母非零时写入 `field`，否则写入 null
#[derive(Debug, Clone)]
pub struct RatioDeriver {
    field: String,
    numerator: String,
    denominator: String,
}

impl From<&DeriveConfig> for RatioDeriver {
    fn from(config: &DeriveConfig) -> Self {
        Self {
            field: config.field.clone(),
            numerator: config.numerator.clone(),
            denominator: config.denominator.clone(),
        }
    }
}

impl ValueDeriver for RatioDeriver {
    fn derive(&self, item: &mut Item) {
        let value = item.value_mut();
        let ratio = match (
            value.get(&self.numerator).and_then(|v| v.as_f64()),
            value.get(&self.denominator).and_then(|v| v.as_f64()),
        ) {
            (Some(n), Some(d)) if d != 0.0 => serde_json::Number::from_f64(n / d),
            _ => None,
        };
        if let Some(map) = value.as_object_mut() {
            map.insert(
                self.field.clone(),
                ratio.map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
            );
        }
    }
}

/// 带派生值计算的数据源
///
/// 先从原始数据源拉取，再逐条计算派生值
pub struct DerivedSource<S, D> {
    source: S,
    deriver: D,
}

impl<S, D> DerivedSource<S, D>
where
    S: DataSource,
    D: ValueDeriver,
{
    pub fn new(source: S, deriver: D) -> Self {
        Self { source, deriver }
    }
}

impl<S: std::fmt::Debug, D> std::fmt::Debug for DerivedSource<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedSource")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, D> DataSource for DerivedSource<S, D>
where
    S: DataSource,
    D: ValueDeriver,
{
    async fn fetch(&self) -> Result<Vec<Item>> {
        let mut items = self.source.fetch().await?;
        for item in items.iter_mut() {
            self.deriver.derive(item);
        }
        Ok(items)
    }
}
