//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后台任务执行器和刷新票据。

use crate::error::{FreshError, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 后台任务
pub type Job = BoxFuture<'static, ()>;

/// 后台任务执行器
///
/// 从队列中取出任务并并发执行，请求路径从不等待这些任务
pub struct BackgroundRunner {
    /// 执行器名称
    name: String,
    /// 任务队列发送端
    tx: mpsc::UnboundedSender<Job>,
    /// 关闭信号
    cancel: CancellationToken,
    /// 执行循环句柄
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BackgroundRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRunner")
            .field("name", &self.name)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl BackgroundRunner {
    /// 启动执行器
    ///
    /// 必须在 tokio 运行时中调用
    ///
    /// # 参数
    ///
    /// * `name` - 执行器名称，用于日志
    /// * `grace` - 关闭时等待在途任务完成的时间
    pub fn start(name: impl Into<String>, grace: Duration) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run(name.clone(), rx, cancel.clone(), grace));

        Self {
            name,
            tx,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// 创建刷新票据，票据被释放时任务入队
    pub fn ticket(&self, job: Job) -> RefreshTicket {
        RefreshTicket {
            job: Some(job),
            tx: self.tx.clone(),
        }
    }

    /// 立即提交任务
    ///
    /// # 返回值
    ///
    /// 执行器已停止时返回 false
    pub fn submit(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }

    /// 停止接收新任务，并在宽限期内等待在途任务完成
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            handle.await.map_err(|e| {
                FreshError::ShutdownError(format!("runner {} did not stop cleanly: {}", self.name, e))
            })?;
        }
        Ok(())
    }

    async fn run(
        name: String,
        mut rx: mpsc::UnboundedReceiver<Job>,
        cancel: CancellationToken,
        grace: Duration,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => {
                        tasks.spawn(job);
                    }
                    None => break,
                },
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        error!("Background task in runner {} panicked: {}", name, e);
                    }
                }
            }
        }

        rx.close();
        let dropped = std::iter::from_fn(|| rx.try_recv().ok()).count();
        if dropped > 0 {
            debug!("Runner {} dropped {} queued tasks on shutdown", name, dropped);
        }

        if !tasks.is_empty() {
            info!(
                "Runner {} waiting up to {:?} for {} in-flight tasks",
                name,
                grace,
                tasks.len()
            );
            let drained = tokio::time::timeout(grace, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!("Runner {} aborting {} tasks after grace period", name, tasks.len());
                tasks.abort_all();
            }
        }

        debug!("Runner {} stopped", name);
    }
}

/// 刷新票据
///
/// 持有一个尚未入队的后台任务。票据被释放（或显式 dispatch）时任务才入队，
/// 因此响应值可以先构造并交给调用方，再触发后台刷新。
#[must_use = "the refresh is enqueued when the ticket is dropped or dispatched"]
pub struct RefreshTicket {
    job: Option<Job>,
    tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for RefreshTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTicket")
            .field("pending", &self.job.is_some())
            .finish()
    }
}

impl RefreshTicket {
    /// 立即将任务入队
    pub fn dispatch(self) {
        drop(self);
    }

    /// 放弃任务，不入队
    pub fn discard(mut self) {
        self.job.take();
    }
}

impl Drop for RefreshTicket {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            if self.tx.send(job).is_err() {
                debug!("Background runner stopped, refresh not scheduled");
            }
        }
    }
}
