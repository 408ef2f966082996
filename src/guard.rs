//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了单飞刷新守卫，保证同一时刻最多只有一个刷新在执行。

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// 刷新守卫
///
/// 进程内的单飞标记。获取失败意味着"跳过"而不是"等待"，
/// 它只决定刷新是否开始，从不阻塞读请求。
#[derive(Debug, Default)]
pub struct RefreshGuard {
    /// 是否有刷新正在执行
    refreshing: AtomicBool,
    /// 释放通知
    released: Notify,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取守卫
    ///
    /// 检查与置位在一次 compare-and-set 中完成。
    ///
    /// # 返回值
    ///
    /// 获取成功返回 true，已被占用返回 false
    pub fn try_acquire(&self) -> bool {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 释放守卫（幂等）
    pub fn release(&self) {
        self.refreshing.store(false, Ordering::Release);
        self.released.notify_waiters();
    }

    /// 是否有刷新正在执行
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// 尝试获取带作用域的许可，许可被 drop 时自动释放守卫
    pub fn try_lock(&self) -> Option<RefreshPermit<'_>> {
        if self.try_acquire() {
            Some(RefreshPermit { guard: self })
        } else {
            None
        }
    }

    /// 等待当前持有者释放守卫
    ///
    /// 守卫空闲时立即返回。
    pub async fn wait_released(&self) {
        let notified = self.released.notified();
        tokio::pin!(notified);
        // 先注册再检查，避免错过检查与等待之间的释放
        notified.as_mut().enable();
        if !self.is_refreshing() {
            return;
        }
        notified.await;
    }
}

/// 刷新许可
///
/// 在所有退出路径（包括错误和 panic 展开）上释放守卫。
#[derive(Debug)]
#[must_use = "dropping the permit releases the refresh guard immediately"]
pub struct RefreshPermit<'a> {
    guard: &'a RefreshGuard,
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
