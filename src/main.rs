//! Ledger demo
//!
//! Seeds two accounts and runs a batch of concurrent transfers in both
//! directions, then prints the final balances.
//!
//! ```text
//! ┌──────────┐    ┌───────────────┐    ┌──────────────────┐
//! │  Config  │───▶│    Store      │───▶│ TransferExecutor │
//! │  (YAML)  │    │ (Pg / memory) │    │ (lock-ordered)   │
//! └──────────┘    └───────────────┘    └──────────────────┘
//! ```
//!
//! Usage: `ledger-demo [--env <name>] [--transfers <n>]`

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use ledger_core::config::AppConfig;
use ledger_core::db::Database;
use ledger_core::logging::init_logging;
use ledger_core::{
    CreateAccountParams, Currency, LedgerStore, MemoryStore, PgStore, TransferExecutor,
    TransferParams,
};

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let lock_timeout = config.ledger.lock_timeout();
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect(url, config.ledger.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await?;
            let store = PgStore::from_database(&db, lock_timeout);
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            info!("No postgres_url configured, using in-memory store");
            Ok(Arc::new(MemoryStore::with_lock_timeout(lock_timeout)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string());
    let transfers: usize = get_arg(&["--transfers", "-n"])
        .map(|n| n.parse::<usize>())
        .transpose()
        .context("--transfers must be a number")?
        .unwrap_or(10);

    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);
    info!(env = %env, git = env!("GIT_HASH"), "Ledger demo starting");

    let store = build_store(&config).await?;
    let executor = TransferExecutor::new(Arc::clone(&store));

    let a = store
        .create_account(CreateAccountParams::new("demo-a", Currency::Usd).with_balance(10_000))
        .await?;
    let b = store
        .create_account(CreateAccountParams::new("demo-b", Currency::Usd).with_balance(10_000))
        .await?;

    let mut handles = Vec::with_capacity(transfers);
    for i in 0..transfers {
        let executor = executor.clone();
        let params = if i % 2 == 0 {
            TransferParams::new(a.id, b.id, 10)
        } else {
            TransferParams::new(b.id, a.id, 10)
        };
        handles.push(tokio::spawn(async move { executor.transfer(params).await }));
    }

    let mut committed = 0usize;
    for result in futures::future::join_all(handles).await {
        match result? {
            Ok(_) => committed += 1,
            Err(e) => error!(
                code = e.code(),
                retryable = e.is_retryable(),
                "Transfer failed: {}",
                e
            ),
        }
    }

    let a = executor.get_account(a.id).await?;
    let b = executor.get_account(b.id).await?;
    info!(committed, total = transfers, "Demo finished");
    println!("{}", serde_json::to_string_pretty(&[a, b])?);
    Ok(())
}
