//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后台任务调度机制。

pub mod runner;

pub use runner::{BackgroundRunner, Job, RefreshTicket};
