//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了 check 命令：加载并验证配置文件。

use super::CheckArgs;
use crate::config::Config;
use crate::utils::redaction::{redact_connection_string, redact_url};
use anyhow::Result;
use secrecy::ExposeSecret;

pub fn execute(args: &CheckArgs) -> Result<()> {
    let config = Config::from_file(&args.config)?;
    println!("{}", summary(&config));
    Ok(())
}

fn summary(config: &Config) -> String {
    let connection = config
        .store
        .connection_string
        .as_ref()
        .map(|s| redact_connection_string(s.expose_secret()))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "Configuration OK\n  service:      {}\n  bind:         {}\n  store:        {:?} ({})\n  table:        {}\n  source:       {}\n  coalesce:     {}\n",
        config.server.service_name,
        config.server.bind_addr,
        config.store.backend,
        connection,
        config.store.table_name,
        redact_url(&config.source.url),
        config.refresh.coalesce_fallback,
    )
}
