//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了刷新协调系统的指标收集和监控功能。

use crate::snapshot::Provenance;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{span, Level};

/// 后台刷新结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshEvent {
    /// 刷新完成并写入存储
    Completed,
    /// 已有刷新在执行，跳过
    SkippedInFlight,
    /// 存储不可用，跳过
    SkippedStoreUnavailable,
    /// 拉取或写入失败
    Failed,
}

impl RefreshEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshEvent::Completed => "completed",
            RefreshEvent::SkippedInFlight => "skipped_in_flight",
            RefreshEvent::SkippedStoreUnavailable => "skipped_store_unavailable",
            RefreshEvent::Failed => "failed",
        }
    }
}

/// 指标收集器
///
/// 用于收集和存储刷新协调系统的各种运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "service:provenance"，失败请求记为 "service:error"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 后台刷新结果统计
    /// key: "service:outcome"
    pub refreshes_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 存储失败统计
    /// key: "service:op"
    pub store_failures_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时
    /// key: "service:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

/// 指标锁被毒化时仍然继续计数
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Metrics {
    /// 记录请求指标
    pub fn record_request(&self, service: &str, provenance: Provenance) {
        let span = span!(Level::TRACE, "fresh_request", service, provenance = provenance.as_str());
        let _enter = span.enter();
        let key = format!("{}:{}", service, provenance.as_str());
        *lock(&self.requests_total).entry(key).or_insert(0) += 1;
    }

    /// 记录失败请求
    pub fn record_request_error(&self, service: &str) {
        let key = format!("{}:error", service);
        *lock(&self.requests_total).entry(key).or_insert(0) += 1;
    }

    /// 记录后台刷新结果
    pub fn record_refresh(&self, service: &str, event: RefreshEvent) {
        let key = format!("{}:{}", service, event.as_str());
        *lock(&self.refreshes_total).entry(key).or_insert(0) += 1;
    }

    /// 记录存储失败
    ///
    /// # 参数
    ///
    /// * `service` - 服务名称
    /// * `op` - 存储操作（latest/append）
    pub fn record_store_failure(&self, service: &str, op: &str) {
        let key = format!("{}:{}", service, op);
        *lock(&self.store_failures_total).entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, service: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}", service, op);
        let mut map = lock(&self.operation_duration);
        let entry = map.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 查询请求计数
    pub fn request_count(&self, service: &str, label: &str) -> u64 {
        lock(&self.requests_total)
            .get(&format!("{}:{}", service, label))
            .copied()
            .unwrap_or(0)
    }

    /// 查询刷新计数
    pub fn refresh_count(&self, service: &str, event: RefreshEvent) -> u64 {
        lock(&self.refreshes_total)
            .get(&format!("{}:{}", service, event.as_str()))
            .copied()
            .unwrap_or(0)
    }

    /// 清空指定服务的全部指标
    pub fn reset_service(&self, service: &str) {
        let prefix = format!("{}:", service);
        lock(&self.requests_total).retain(|k, _| !k.starts_with(&prefix));
        lock(&self.refreshes_total).retain(|k, _| !k.starts_with(&prefix));
        lock(&self.store_failures_total).retain(|k, _| !k.starts_with(&prefix));
        lock(&self.operation_duration).retain(|k, _| !k.starts_with(&prefix));
    }
}

fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once(':').unwrap_or((key, ""))
}

/// 获取指标字符串
///
/// 将所有指标格式化为 Prometheus 文本格式，用于监控系统采集
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    for (k, v) in lock(&metrics.requests_total).iter() {
        let (service, result) = split_key(k);
        output.push_str(&format!(
            "fresh_requests_total{{service=\"{}\", result=\"{}\"}} {}\n",
            service, result, v
        ));
    }
    for (k, v) in lock(&metrics.refreshes_total).iter() {
        let (service, outcome) = split_key(k);
        output.push_str(&format!(
            "fresh_background_refreshes_total{{service=\"{}\", outcome=\"{}\"}} {}\n",
            service, outcome, v
        ));
    }
    for (k, v) in lock(&metrics.store_failures_total).iter() {
        let (service, op) = split_key(k);
        output.push_str(&format!(
            "fresh_store_failures_total{{service=\"{}\", operation=\"{}\"}} {}\n",
            service, op, v
        ));
    }
    for (k, (total, count)) in lock(&metrics.operation_duration).iter() {
        let (service, op) = split_key(k);
        output.push_str(&format!(
            "fresh_operation_duration_seconds_sum{{service=\"{}\", operation=\"{}\"}} {}\n",
            service, op, total
        ));
        output.push_str(&format!(
            "fresh_operation_duration_seconds_count{{service=\"{}\", operation=\"{}\"}} {}\n",
            service, op, count
        ));
    }
    output
}
