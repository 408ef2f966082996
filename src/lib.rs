//! oxfresh - 快照新鲜度协调服务
//!
//! 在昂贵的上游数据集前提供"先响应、后刷新"的快照缓存：
//! 命中时立即返回存储中的快照并在响应之后触发单飞后台刷新，
//! 无快照或存储不可用时同步回源。

#![doc(html_root_url = "https://docs.rs/oxfresh/0.1.0")]

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod health;
pub mod http;
pub mod metrics;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use config::Config;
pub use coordinator::{CoordinatorOptions, FreshnessCoordinator, RefreshOutcome, Served, SkipReason};
pub use error::{FreshError, Result};
pub use guard::RefreshGuard;
pub use snapshot::{Item, Provenance, Snapshot};
pub use source::{DataSource, DerivedSource, ValueDeriver};
pub use store::{DatabaseStore, MemoryStore, SnapshotStore};

/// oxfresh 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
