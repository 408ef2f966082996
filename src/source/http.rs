//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于HTTP的上游数据源。

use super::DataSource;
use crate::config::SourceConfig;
use crate::error::{FreshError, Result};
use crate::snapshot::Item;
use crate::utils::redaction::redact_url;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// HTTP数据源
///
/// GET 配置的地址，接受 JSON 数组或带 `items` 数组的对象
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("oxfresh/{}", crate::VERSION));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(user_agent)
            .build()
            .map_err(|e| FreshError::ConfigError(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn items_from_payload(payload: serde_json::Value) -> Result<Vec<Item>> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(FreshError::FetchFailed(
                    "upstream object has no `items` array".to_string(),
                ))
            }
        },
        other => {
            return Err(FreshError::FetchFailed(format!(
                "unexpected upstream payload type: {}",
                match other {
                    serde_json::Value::Null => "null",
                    serde_json::Value::Bool(_) => "bool",
                    serde_json::Value::Number(_) => "number",
                    _ => "string",
                }
            )))
        }
    };
    Ok(items.into_iter().map(Item::new).collect())
}

#[async_trait]
impl DataSource for HttpSource {
    #[instrument(skip(self), level = "debug", fields(url = %redact_url(&self.url)))]
    async fn fetch(&self) -> Result<Vec<Item>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FreshError::FetchFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FreshError::FetchFailed(format!(
                "upstream returned {}",
                status
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FreshError::FetchFailed(format!("invalid upstream body: {}", e)))?;

        let items = items_from_payload(payload)?;
        debug!("Fetched {} items from upstream", items.len());
        Ok(items)
    }
}
