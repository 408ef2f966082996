//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了新鲜度协调器：决定返回存储中的快照、触发后台刷新，
//! 还是在无快照或存储不可用时同步回源。

use crate::config::Config;
use crate::error::{FreshError, Result};
use crate::guard::RefreshGuard;
use crate::health::{HealthState, StoreHealth};
use crate::metrics::{RefreshEvent, GLOBAL_METRICS};
use crate::snapshot::{Provenance, Snapshot};
use crate::source::DataSource;
use crate::store::SnapshotStore;
use crate::sync::{BackgroundRunner, Job, RefreshTicket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// 协调器选项
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// 服务名称
    pub service_name: String,
    /// 同步回源是否参与单飞守卫
    pub coalesce_fallback: bool,
    /// 关闭时等待后台刷新的时间
    pub shutdown_grace: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            service_name: "catalog".to_string(),
            coalesce_fallback: true,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for CoordinatorOptions {
    fn from(config: &Config) -> Self {
        Self {
            service_name: config.server.service_name.clone(),
            coalesce_fallback: config.refresh.coalesce_fallback,
            shutdown_grace: Duration::from_millis(config.refresh.shutdown_grace_ms),
        }
    }
}

/// 后台刷新跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 存储连接尚未建立，刷新结果无处写入
    StoreUnavailable,
    /// 已有刷新在执行
    InFlight,
}

/// 后台刷新结果
///
/// 只用于观测和测试，后台刷新从不向任何调用方抛出错误
#[derive(Debug)]
pub enum RefreshOutcome {
    /// 拉取并写入了新快照
    Completed { items: usize },
    /// 未执行
    Skipped(SkipReason),
    /// 拉取或写入失败，本轮放弃
    Failed(FreshError),
}

impl RefreshOutcome {
    fn event(&self) -> RefreshEvent {
        match self {
            RefreshOutcome::Completed { .. } => RefreshEvent::Completed,
            RefreshOutcome::Skipped(SkipReason::InFlight) => RefreshEvent::SkippedInFlight,
            RefreshOutcome::Skipped(SkipReason::StoreUnavailable) => {
                RefreshEvent::SkippedStoreUnavailable
            }
            RefreshOutcome::Failed(_) => RefreshEvent::Failed,
        }
    }
}

/// 请求结果
///
/// 缓存命中时携带一张刷新票据：票据在响应构造完成、结果被释放后才把后台刷新入队。
#[derive(Debug)]
pub struct Served {
    snapshot: Arc<Snapshot>,
    provenance: Provenance,
    ticket: Option<RefreshTicket>,
}

impl Served {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// 是否有待入队的后台刷新
    pub fn has_pending_refresh(&self) -> bool {
        self.ticket.is_some()
    }

    /// 拆分为快照、来源和刷新票据
    pub fn into_parts(self) -> (Arc<Snapshot>, Provenance, Option<RefreshTicket>) {
        (self.snapshot, self.provenance, self.ticket)
    }
}

/// 存储读取结果
enum StoreLookup {
    Hit(Snapshot),
    Empty,
    Unavailable,
}

struct CoordinatorInner {
    service_name: String,
    store: Arc<dyn SnapshotStore>,
    source: Arc<dyn DataSource>,
    guard: RefreshGuard,
    coalesce_fallback: bool,
    health: StoreHealth,
    /// 最近一次拉取到的快照
    last_fetched: RwLock<Option<Arc<Snapshot>>>,
    /// 每次成功拉取递增，供等待者判断在途刷新是否产出了结果
    generation: AtomicU64,
}

/// 新鲜度协调器
///
/// 克隆开销很小，所有克隆共享同一个刷新守卫和后台执行器。
#[derive(Clone)]
pub struct FreshnessCoordinator {
    inner: Arc<CoordinatorInner>,
    runner: Arc<BackgroundRunner>,
}

impl std::fmt::Debug for FreshnessCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessCoordinator")
            .field("service_name", &self.inner.service_name)
            .field("store", &self.inner.store)
            .field("source", &self.inner.source)
            .field("refreshing", &self.inner.guard.is_refreshing())
            .field("coalesce_fallback", &self.inner.coalesce_fallback)
            .finish()
    }
}

impl FreshnessCoordinator {
    /// 创建新的协调器并启动后台执行器
    ///
    /// 必须在 tokio 运行时中调用
    ///
    /// # 参数
    ///
    /// * `store` - 快照存储
    /// * `source` - 上游数据源
    /// * `options` - 协调器选项
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        source: Arc<dyn DataSource>,
        options: CoordinatorOptions,
    ) -> Self {
        let runner = Arc::new(BackgroundRunner::start(
            format!("{}-refresh", options.service_name),
            options.shutdown_grace,
        ));

        info!(
            "Initializing freshness coordinator for {} (coalesce_fallback={})",
            options.service_name, options.coalesce_fallback
        );

        Self {
            inner: Arc::new(CoordinatorInner {
                health: StoreHealth::new(options.service_name.clone()),
                service_name: options.service_name,
                store,
                source,
                guard: RefreshGuard::new(),
                coalesce_fallback: options.coalesce_fallback,
                last_fetched: RwLock::new(None),
                generation: AtomicU64::new(0),
            }),
            runner,
        }
    }

    /// 处理一次数据请求
    ///
    /// 存储有快照时立即返回并携带后台刷新票据；无快照或存储读取失败时同步回源。
    /// 只有同步回源失败会返回错误。
    #[instrument(skip(self), level = "info", name = "handle_request", fields(service = %self.inner.service_name))]
    pub async fn handle_request(&self) -> Result<Served> {
        let started = Instant::now();
        let inner = &self.inner;
        let generation = inner.generation.load(Ordering::Acquire);

        let result = match inner.read_latest().await {
            StoreLookup::Hit(snapshot) => {
                debug!(
                    "Serving cached snapshot captured at {} ({} items)",
                    snapshot.captured_at,
                    snapshot.len()
                );
                Ok(Served {
                    snapshot: Arc::new(snapshot),
                    provenance: Provenance::Cache,
                    ticket: Some(self.runner.ticket(self.refresh_job())),
                })
            }
            StoreLookup::Empty => {
                info!("No cache available. Fetching live");
                inner.fetch_live(true, generation).await.map(Served::live)
            }
            StoreLookup::Unavailable => {
                // 读取失败但连接仍在时照常写入
                let persist = inner.store.is_available();
                info!("Snapshot store read failed. Fetching live (persist={})", persist);
                inner.fetch_live(persist, generation).await.map(Served::live)
            }
        };

        GLOBAL_METRICS.record_duration(
            &inner.service_name,
            "request",
            started.elapsed().as_secs_f64(),
        );
        match &result {
            Ok(served) => GLOBAL_METRICS.record_request(&inner.service_name, served.provenance),
            Err(e) => {
                error!("Live fetch failed with no cached snapshot: {}", e);
                GLOBAL_METRICS.record_request_error(&inner.service_name);
            }
        }

        result
    }

    /// 执行一次后台刷新
    ///
    /// 存储不可用或已有刷新在执行时直接跳过；失败只记录，不抛出。
    pub async fn background_refresh(&self) -> RefreshOutcome {
        self.inner.background_refresh().await
    }

    /// 立即把一次后台刷新交给执行器，不等待其完成
    pub fn schedule_refresh(&self) -> bool {
        self.runner.submit(self.refresh_job())
    }

    fn refresh_job(&self) -> Job {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.background_refresh().await;
        })
    }

    /// 是否有刷新正在执行
    pub fn is_refreshing(&self) -> bool {
        self.inner.guard.is_refreshing()
    }

    /// 刷新守卫
    pub fn guard(&self) -> &RefreshGuard {
        &self.inner.guard
    }

    /// 最近一次拉取到的快照
    pub async fn last_fetched(&self) -> Option<Arc<Snapshot>> {
        self.inner.last_fetched().await
    }

    /// 存储健康状态
    pub async fn store_health(&self) -> HealthState {
        self.inner.health.state().await
    }

    /// 存储连接是否已建立
    pub fn store_available(&self) -> bool {
        self.inner.store.is_available()
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// 停止后台执行器，等待在途刷新在宽限期内完成
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down freshness coordinator for {}", self.inner.service_name);
        self.runner.shutdown().await
    }
}

impl Served {
    fn live(snapshot: Arc<Snapshot>) -> Self {
        Self {
            snapshot,
            provenance: Provenance::Live,
            ticket: None,
        }
    }
}

impl CoordinatorInner {
    async fn read_latest(&self) -> StoreLookup {
        let started = Instant::now();
        let result = self
            .store
            .latest()
            .await
            .map_err(FreshError::into_store_unavailable);
        GLOBAL_METRICS.record_duration(
            &self.service_name,
            "store_latest",
            started.elapsed().as_secs_f64(),
        );

        match result {
            Ok(Some(snapshot)) => {
                self.health.record_success().await;
                StoreLookup::Hit(snapshot)
            }
            Ok(None) => {
                self.health.record_success().await;
                StoreLookup::Empty
            }
            Err(e) => {
                warn!("Snapshot store read failed, falling back to live fetch: {}", e);
                self.health.record_failure().await;
                GLOBAL_METRICS.record_store_failure(&self.service_name, "latest");
                StoreLookup::Unavailable
            }
        }
    }

    /// 同步回源
    ///
    /// 启用合并时，同一时刻只有持有守卫的一方访问数据源：请求开始后已有拉取完成则直接复用其结果；
    /// 守卫被占用则等待释放后重新竞争，在途拉取失败时由下一个获得守卫的请求重试一次。
    ///
    /// # 参数
    ///
    /// * `persist` - 是否写入存储（存储连接不可用时为 false）
    /// * `generation` - 请求开始时的拉取代数
    async fn fetch_live(&self, persist: bool, generation: u64) -> Result<Arc<Snapshot>> {
        if !self.coalesce_fallback {
            return self.fetch_and_store(persist).await;
        }

        loop {
            if let Some(_permit) = self.guard.try_lock() {
                if let Some(snapshot) = self.fetched_since(generation).await {
                    debug!("Reusing snapshot fetched after this request started");
                    return Ok(snapshot);
                }
                return self.fetch_and_store(persist).await;
            }

            debug!("Fetch already in flight, waiting for its result");
            self.guard.wait_released().await;

            if let Some(snapshot) = self.fetched_since(generation).await {
                debug!("Reusing snapshot fetched by the in-flight refresh");
                return Ok(snapshot);
            }
        }
    }

    async fn fetched_since(&self, generation: u64) -> Option<Arc<Snapshot>> {
        if self.generation.load(Ordering::Acquire) == generation {
            return None;
        }
        self.last_fetched().await
    }

    async fn fetch_and_store(&self, persist: bool) -> Result<Arc<Snapshot>> {
        let snapshot = Arc::new(Snapshot::new(self.fetch_items().await?));
        self.remember(&snapshot).await;

        if persist {
            if let Err(e) = self.persist(&snapshot).await {
                warn!("Failed to persist live snapshot, serving it anyway: {}", e);
            }
        }

        Ok(snapshot)
    }

    async fn background_refresh(&self) -> RefreshOutcome {
        let outcome = self.run_refresh().await;
        GLOBAL_METRICS.record_refresh(&self.service_name, outcome.event());
        outcome
    }

    #[instrument(skip(self), level = "info", name = "background_refresh", fields(service = %self.service_name))]
    async fn run_refresh(&self) -> RefreshOutcome {
        if !self.store.is_available() {
            debug!("Snapshot store not connected, skipping background refresh");
            return RefreshOutcome::Skipped(SkipReason::StoreUnavailable);
        }

        let Some(_permit) = self.guard.try_lock() else {
            info!("Background refresh already in progress. Skipping");
            return RefreshOutcome::Skipped(SkipReason::InFlight);
        };

        info!("Starting background data refresh");
        let items = match self.fetch_items().await {
            Ok(items) => items,
            Err(e) => {
                error!("Background refresh failed: {}", e);
                return RefreshOutcome::Failed(e);
            }
        };

        let snapshot = Arc::new(Snapshot::new(items));
        self.remember(&snapshot).await;

        match self.persist(&snapshot).await {
            Ok(()) => {
                info!("Background refresh complete ({} items)", snapshot.len());
                RefreshOutcome::Completed {
                    items: snapshot.len(),
                }
            }
            Err(e) => {
                error!("Background refresh could not persist snapshot: {}", e);
                RefreshOutcome::Failed(e)
            }
        }
    }

    async fn fetch_items(&self) -> Result<Vec<crate::snapshot::Item>> {
        let started = Instant::now();
        let result = self
            .source
            .fetch()
            .await
            .map_err(FreshError::into_fetch_failed);
        GLOBAL_METRICS.record_duration(
            &self.service_name,
            "fetch",
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let started = Instant::now();
        let result = self
            .store
            .append(snapshot)
            .await
            .map_err(FreshError::into_persist_failed);
        GLOBAL_METRICS.record_duration(
            &self.service_name,
            "store_append",
            started.elapsed().as_secs_f64(),
        );

        match &result {
            Ok(()) => self.health.record_success().await,
            Err(_) => {
                self.health.record_failure().await;
                GLOBAL_METRICS.record_store_failure(&self.service_name, "append");
            }
        }
        result
    }

    async fn remember(&self, snapshot: &Arc<Snapshot>) {
        *self.last_fetched.write().await = Some(snapshot.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    async fn last_fetched(&self) -> Option<Arc<Snapshot>> {
        self.last_fetched.read().await.clone()
    }
}
