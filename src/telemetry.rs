//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志和链路追踪的初始化。

use crate::config::LoggingConfig;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// 初始化日志与链路追踪
///
/// 应在进程启动时调用一次。`RUST_LOG` 存在时覆盖配置中的过滤表达式。
///
/// # 参数
///
/// * `service_name` - 服务名称
/// * `config` - 日志配置
///
/// # 返回值
///
/// 全局 subscriber 已被设置时返回 false
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let (json_layer, plain_layer) = if config.json {
        (Some(fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    // 未配置导出器时 provider 为 no-op，只负责生成 trace id
    let telemetry = if config.opentelemetry {
        let provider = SdkTracerProvider::builder().build();
        global::set_tracer_provider(provider.clone());
        let tracer = provider.tracer(service_name.to_string());
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    Registry::default()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(telemetry)
        .try_init()
        .is_ok()
}
