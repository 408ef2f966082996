//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和可控的存储、数据源替身。

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use oxfresh::error::{FreshError, Result};
use oxfresh::{
    CoordinatorOptions, DataSource, FreshnessCoordinator, Item, MemoryStore, Snapshot,
    SnapshotStore,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();
static SERVICE_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 生成唯一的服务名称，避免全局指标在测试之间串扰
pub fn generate_unique_service_name(base: &str) -> String {
    format!(
        "{}_{}_{}",
        base,
        std::process::id(),
        SERVICE_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

pub fn options(base: &str) -> CoordinatorOptions {
    CoordinatorOptions {
        service_name: generate_unique_service_name(base),
        coalesce_fallback: true,
        shutdown_grace: Duration::from_secs(2),
    }
}

/// 生成带名称的测试条目
pub fn items(names: &[&str]) -> Vec<Item> {
    names
        .iter()
        .map(|name| Item::new(json!({ "name": name })))
        .collect()
}

pub fn item_names(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .items
        .iter()
        .filter_map(|item| item.value()["name"].as_str().map(str::to_string))
        .collect()
}

/// 一小时前采集的快照
pub fn stale_snapshot(names: &[&str]) -> Snapshot {
    Snapshot::captured_at(Utc::now() - ChronoDuration::hours(1), items(names))
}

pub fn coordinator(
    store: Arc<dyn SnapshotStore>,
    source: Arc<dyn DataSource>,
    base: &str,
) -> FreshnessCoordinator {
    setup_logging();
    FreshnessCoordinator::new(store, source, options(base))
}

/// 轮询条件直到满足，超时则失败
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s: {}", what);
}

/// 可注入故障的快照存储
///
/// 读取、写入和连接状态可以分别切换，并统计调用次数
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_appends: AtomicBool,
    available: AtomicBool,
    reads: AtomicUsize,
    appends: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::with_snapshots(Vec::new())
    }

    pub fn with_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self {
            inner: MemoryStore::with_snapshots(snapshots),
            fail_reads: AtomicBool::new(false),
            fail_appends: AtomicBool::new(false),
            available: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
        }
    }

    /// 模拟不可达的存储：读写都失败，连接未建立
    pub fn unreachable() -> Self {
        let store = Self::new();
        store.set_fail_reads(true);
        store.set_fail_appends(true);
        store.set_available(false);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// 尝试写入的次数（含失败）
    pub fn append_attempts(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Vec<Snapshot> {
        self.inner.all().await
    }
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn latest(&self) -> Result<Option<Snapshot>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FreshError::StoreUnavailable("connection refused".to_string()));
        }
        self.inner.latest().await
    }

    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(FreshError::StoreUnavailable("write rejected".to_string()));
        }
        self.inner.append(snapshot).await
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// 拉取闸门
///
/// 拉取进入后阻塞，直到测试放行
#[derive(Debug)]
pub struct Gate {
    entered: Notify,
    open: Semaphore,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            open: Semaphore::new(0),
        }
    }

    /// 等待至少一次拉取进入闸门
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// 放行指定次数的拉取
    pub fn release(&self, permits: usize) {
        self.open.add_permits(permits);
    }

    async fn pass(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.open.acquire().await {
            permit.forget();
        }
    }
}

/// 计数数据源
///
/// 返回固定条目，可切换为失败，可选地在闸门处阻塞
#[derive(Debug)]
pub struct CountingSource {
    items: Vec<Item>,
    calls: AtomicUsize,
    failing: AtomicBool,
    failures_left: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

impl CountingSource {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            failures_left: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing() -> Self {
        let source = Self::new(Vec::new());
        source.set_failing(true);
        source
    }

    pub fn gated(items: Vec<Item>) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::new());
        let mut source = Self::new(items);
        source.gate = Some(gate.clone());
        (source, gate)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 接下来的 `n` 次拉取失败，之后恢复
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DataSource for CountingSource {
    async fn fetch(&self) -> Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if self.failing.load(Ordering::SeqCst) || self.take_failure() {
            return Err(FreshError::FetchFailed("upstream returned 503".to_string()));
        }
        Ok(self.items.clone())
    }
}
