//! tracelabel entry point.
//!
//! Parses one command, loads layered configuration and runs the task.
//! Logging goes to stderr so stdout carries only the task result.

use anyhow::Result;
use clap::Parser;
use tracelabel_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod cli;
mod runner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = cli::Cli::parse();
    runner::run(cli.command, AppConfig::load()).await
}
