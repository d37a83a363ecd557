// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use lakegate::config::AppConfig;
use lakegate::governor::QueryGovernor;
use lakegate::lifecycle::{QueryLifecycle, QueryOptions};
use lakegate::sql_guard::SqlGuard;
use lakegate::transport::TransportClient;

/// Run one read-only query against the configured security data lake and
/// print the rows as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "lakegate", version, about = "Read-only query gateway for a security data lake")]
struct Cli {
    /// SQL text to execute (single SELECT statement)
    query: String,

    /// Maximum number of rows to return
    #[arg(long)]
    limit: Option<usize>,

    /// Wall-clock budget for the whole lifecycle, in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let governor = Arc::new(QueryGovernor::new(config.governor_config()));
    let transport = Arc::new(TransportClient::new(
        &config.api_url,
        config.api_token.clone(),
        Arc::clone(&governor),
        config.retry_config(),
        config.request_timeout(),
    )?);
    let guard = SqlGuard::new(config.table_allowlist.clone());
    let lifecycle = QueryLifecycle::new(guard, transport, governor, config.lifecycle_config());

    let options = QueryOptions {
        row_limit: cli.limit,
        deadline: cli.timeout.map(Duration::from_secs),
    };

    let outcome = lifecycle
        .execute(&cli.query, options)
        .await
        .context("query lifecycle failed")?;

    info!(
        query_id = outcome.query.id.as_deref().unwrap_or("-"),
        rows = outcome.rows.len(),
        pages = outcome.pages,
        "Query finished"
    );

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for row in &outcome.rows {
        serde_json::to_writer(&mut handle, row).context("failed to write row")?;
        use std::io::Write;
        writeln!(handle)?;
    }

    Ok(())
}
