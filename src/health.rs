//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了快照存储的健康状态跟踪。

use std::time::Instant;
use tokio::sync::RwLock;

/// 连续成功多少次后视为恢复
const RECOVERY_THRESHOLD: u32 = 3;

/// 健康状态枚举
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthState {
    /// 健康状态
    Healthy,
    /// 降级状态
    Degraded { since: Instant, failure_count: u32 },
    /// 恢复中状态
    Recovering { since: Instant, success_count: u32 },
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded { .. } => "degraded",
            HealthState::Recovering { .. } => "recovering",
        }
    }
}

/// 存储健康跟踪器
///
/// 根据每次存储读写的结果更新状态，只用于观测，不参与协调决策
#[derive(Debug)]
pub struct StoreHealth {
    /// 服务名称
    service_name: String,
    /// 健康状态
    state: RwLock<HealthState>,
}

impl StoreHealth {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            state: RwLock::new(HealthState::Healthy),
        }
    }

    /// 获取当前健康状态
    pub async fn state(&self) -> HealthState {
        *self.state.read().await
    }

    /// 记录一次成功的存储操作
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        let new_state = match *state {
            HealthState::Healthy => HealthState::Healthy,
            HealthState::Degraded { failure_count, .. } => {
                tracing::info!(
                    "服务 {} 存储正在恢复 (failure_count={})",
                    self.service_name,
                    failure_count
                );
                HealthState::Recovering {
                    since: Instant::now(),
                    success_count: 1,
                }
            }
            HealthState::Recovering {
                since,
                success_count,
            } => {
                if success_count + 1 >= RECOVERY_THRESHOLD {
                    HealthState::Healthy
                } else {
                    HealthState::Recovering {
                        since,
                        success_count: success_count + 1,
                    }
                }
            }
        };
        self.transition(&mut state, new_state);
    }

    /// 记录一次失败的存储操作
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        let new_state = match *state {
            HealthState::Healthy => {
                tracing::warn!("服务 {} 存储已降级", self.service_name);
                HealthState::Degraded {
                    since: Instant::now(),
                    failure_count: 1,
                }
            }
            HealthState::Degraded {
                since,
                failure_count,
            } => HealthState::Degraded {
                since,
                failure_count: failure_count.saturating_add(1),
            },
            HealthState::Recovering { success_count, .. } => {
                tracing::info!(
                    "服务 {} 恢复失败，回到降级状态 (success_count={})",
                    self.service_name,
                    success_count
                );
                HealthState::Degraded {
                    since: Instant::now(),
                    failure_count: 1,
                }
            }
        };
        self.transition(&mut state, new_state);
    }

    fn transition(&self, state: &mut HealthState, new_state: HealthState) {
        if std::mem::discriminant(state) != std::mem::discriminant(&new_state) {
            tracing::info!(
                "服务 {} 存储健康状态变更: {} -> {}",
                self.service_name,
                state.as_str(),
                new_state.as_str()
            );
        }
        *state = new_state;
    }
}
