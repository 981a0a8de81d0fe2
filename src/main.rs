//! Loyalty Ledger - accrual service process
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌──────────────┐    ┌──────────┐
//! │  Rescan  │───▶│ Dispatcher │───▶│ Accrual HTTP │───▶│  Ledger  │──▶ PostgreSQL
//! │ (ticker) │    │(queue+pool)│    │   client     │    │   (tx)   │
//! └──────────┘    └────────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Usage: `loyalty-ledger [--env|-e <name>]` loads `config/<name>.yaml`
//! (default `dev`). Ctrl-C drains the queue and exits.

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use loyalty_ledger::dispatcher::rescan::RescanSettings;
use loyalty_ledger::logging::init_logging;
use loyalty_ledger::{
    AccrualDispatcher, AppConfig, DispatchSettings, HttpAccrualClient, Ledger, LedgerStore,
    OrderSink, PgStore, RescanWorker, ShutdownSignal,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env).with_context(|| format!("loading config for env {}", env))?;
    let _log_guard = init_logging(&config).context("initializing logging")?;

    info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting loyalty ledger"
    );

    // Storage
    let pg = PgStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("connecting to PostgreSQL")?;
    pg.health_check().await.context("database health check")?;
    if config.database.init_schema {
        pg.init_schema().await.context("initializing schema")?;
    }
    let store: Arc<dyn LedgerStore> = Arc::new(pg);

    // Accrual pipeline
    let provider = Arc::new(
        HttpAccrualClient::new(&config.accrual.base_url, config.accrual.request_timeout())
            .context("building accrual client")?,
    );
    info!(base_url = provider.base_url(), "Accrual client ready");

    let ledger = Arc::new(Ledger::new(store.clone()));
    let dispatcher = AccrualDispatcher::start(
        DispatchSettings::from_config(&config.dispatcher, config.accrual.request_timeout()),
        provider,
        ledger,
    );

    let shutdown = ShutdownSignal::new();
    let rescan_task = if config.rescan.enabled {
        let sink: Arc<dyn OrderSink> = dispatcher.clone();
        let rescan = RescanWorker::new(
            store.clone(),
            sink,
            RescanSettings::from(&config.rescan),
        );
        let signal = shutdown.clone();
        Some(tokio::spawn(async move { rescan.run(signal).await }))
    } else {
        info!("Rescan disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutdown requested");

    // The dispatcher closes before the rescan is awaited, so a scan in progress stops early
    shutdown.request_shutdown();
    dispatcher.shutdown().await;
    if let Some(task) = rescan_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Rescan task ended abnormally");
        }
    }

    info!("Loyalty ledger stopped");
    Ok(())
}
