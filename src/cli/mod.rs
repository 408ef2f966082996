//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oxfresh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "serve", about = "Run the HTTP service")]
    Serve(ServeArgs),

    #[command(name = "check", about = "Validate a configuration file")]
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[arg(short, long, default_value = "oxfresh.toml", help = "Path to the TOML configuration")]
    pub config: PathBuf,

    #[arg(short, long, help = "Override server.bind_addr")]
    pub bind: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[arg(short, long, default_value = "oxfresh.toml", help = "Path to the TOML configuration")]
    pub config: PathBuf,
}

mod check;
mod serve;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve(args) => serve::execute(args).await,
        Commands::Check(args) => check::execute(args),
    }
}
