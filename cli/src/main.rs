// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Dropship CLI
//!
//! Entry point for the `dropship` binary. Parses CLI arguments, initializes
//! logging, and runs one of:
//!
//! - `distribute` — send to a recipient list through a JSON-RPC node
//! - `simulate`   — the same batch against an in-process ledger
//! - `devnode`    — serve an in-process ledger over JSON-RPC
//! - `address`    — derive (or generate) an account address
//! - `version`    — print build version information

mod cli;
mod devnode;
mod logging;
mod metrics;
mod recipients;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::signal;

use dropship_protocol::config::TRANSACTION_VERSION;
use dropship_protocol::crypto::{Address, Credential};
use dropship_protocol::dispatch::{BatchDistributor, BatchEvent, BatchSummary, NonceAllocator};
use dropship_protocol::network::{ConnectionSupervisor, HttpConnector, InMemoryLedger, MemoryConnector};
use dropship_protocol::transaction::Transfer;

use cli::{BatchArgs, Commands, DropshipCli};
use logging::LogFormat;
use metrics::BatchMetrics;

/// Receipt poll interval for `simulate` when none is configured. The
/// in-process ledger answers instantly, so the production default only
/// slows the run down.
const SIMULATED_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DropshipCli::parse();
    let format = LogFormat::from_str_lossy(&cli.log_format);

    match cli.command {
        Commands::Distribute(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, format);
            distribute(args).await
        }
        Commands::Simulate(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, format);
            simulate(args).await
        }
        Commands::Devnode(args) => {
            logging::init_logging(logging::DEVNODE_FILTER, format);
            run_devnode(args).await
        }
        Commands::Address(args) => print_address(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Distributes through a real node.
async fn distribute(args: cli::DistributeArgs) -> Result<()> {
    let credential = Credential::from_hex(&args.key).context("invalid --key")?;
    let recipients = recipients::load_recipients(&args.batch.recipients)?;
    let config = args.batch.dispatch_config()?;

    let connector = Arc::new(HttpConnector::new(Duration::from_secs(
        args.request_timeout_secs,
    )));
    let supervisor = ConnectionSupervisor::new(&args.endpoint, connector, config.supervisor.clone())
        .context("invalid --endpoint")?;

    tracing::info!(
        endpoint = %args.endpoint,
        sender = %credential.address(),
        recipients = recipients.len(),
        "starting dropship"
    );

    let summary = run_batch(Arc::new(supervisor), credential, recipients, &args.batch, config).await?;
    finish(&summary)
}

/// Runs the batch against a seeded in-process ledger.
async fn simulate(args: cli::SimulateArgs) -> Result<()> {
    let credential = match &args.key {
        Some(key) => Credential::from_hex(key).context("invalid --key")?,
        None => Credential::generate(),
    };
    let recipients = recipients::load_recipients(&args.batch.recipients)?;
    let mut config = args.batch.dispatch_config()?;
    if args.batch.poll_interval_ms.is_none() && args.batch.config.is_none() {
        config.receipt.poll_interval = SIMULATED_POLL_INTERVAL;
    }

    let ledger = Arc::new(
        InMemoryLedger::new(args.chain_id).with_finalize_after_polls(args.finalize_after_polls),
    );
    ledger.fund(credential.address(), u128::MAX / 2);
    match args.batch.transfer() {
        Transfer::Token { contract, .. } => {
            ledger.deploy_token(contract, args.token_decimals);
            ledger.mint(contract, credential.address(), u128::MAX / 2);
        }
        Transfer::Mint { contract, .. } => {
            ledger.deploy_token(contract, args.token_decimals);
            ledger.grant_minter(contract, credential.address());
        }
        Transfer::Native { .. } => {}
    }
    for recipient in &args.reject {
        ledger.reject_transfers_to(*recipient);
    }
    for recipient in &args.revert {
        ledger.revert_transfers_to(*recipient);
    }

    let supervisor = ConnectionSupervisor::new(
        "memory://simulated",
        Arc::new(MemoryConnector::new(ledger.clone())),
        config.supervisor.clone(),
    )?;

    tracing::info!(
        chain_id = args.chain_id,
        sender = %credential.address(),
        recipients = recipients.len(),
        "starting simulation"
    );

    let summary = run_batch(Arc::new(supervisor), credential, recipients, &args.batch, config).await?;
    finish(&summary)
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    event: &'static str,
    #[serde(flatten)]
    summary: &'a BatchSummary,
}

/// Spawns the batch, streams its events to stdout, and wires Ctrl+C to
/// cancellation.
async fn run_batch(
    supervisor: Arc<ConnectionSupervisor>,
    credential: Credential,
    recipients: Vec<Address>,
    batch: &BatchArgs,
    config: dropship_protocol::config::DispatchConfig,
) -> Result<BatchSummary> {
    let mut metrics = BatchMetrics::new().context("failed to create metrics registry")?;
    metrics.recipients.set(recipients.len() as i64);

    let distributor = Arc::new(BatchDistributor::new(
        supervisor.clone(),
        Arc::new(NonceAllocator::new()),
        &config,
    ));
    let mut handle = distributor.spawn(Arc::new(credential), recipients, batch.transfer());

    let cancel = handle.cancel.clone();
    let interrupt = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("interrupt received, no further recipients will be started");
        cancel.cancel();
    });

    while let Some(event) = handle.events.recv().await {
        metrics.observe(&event);
        print_event(&event, batch.json)?;
    }
    interrupt.abort();

    let results = handle.join.await.context("batch task failed")??;
    metrics.reconnects_total.inc_by(supervisor.reconnect_count());

    let summary = BatchSummary::from_results(&results);
    if batch.json {
        let line = SummaryLine {
            event: "summary",
            summary: &summary,
        };
        println!("{}", serde_json::to_string(&line)?);
    } else {
        println!("{}", summary);
    }

    if let Some(path) = &batch.metrics_file {
        metrics.write_to(path)?;
        tracing::info!(path = %path.display(), "metrics written");
    }
    Ok(summary)
}

fn print_event(event: &BatchEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{}", event);
    }
    Ok(())
}

fn finish(summary: &BatchSummary) -> Result<()> {
    anyhow::ensure!(
        summary.all_succeeded(),
        "{} of {} transfers did not succeed",
        summary.total - summary.succeeded,
        summary.total
    );
    Ok(())
}

async fn run_devnode(args: cli::DevnodeArgs) -> Result<()> {
    let ledger = Arc::new(
        InMemoryLedger::new(args.chain_id)
            .with_fee_unit_price(args.fee_unit_price)
            .with_finalize_after_polls(args.finalize_after_polls),
    );
    if let Some(token) = args.token {
        ledger.deploy_token(token, args.token_decimals);
        if let Some(minter) = args.fund.first() {
            ledger.grant_minter(token, *minter);
            tracing::info!(%token, %minter, "granted mint rights");
        }
    }
    for account in &args.fund {
        ledger.fund(*account, args.balance);
        if let Some(token) = args.token {
            ledger.mint(token, *account, args.balance);
        }
        tracing::info!(%account, balance = args.balance, "funded account");
    }

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind devnode listener on {}", addr))?;
    tracing::info!(chain_id = args.chain_id, "devnode listening on {}", addr);
    println!("JSON-RPC endpoint: http://{}/", addr);

    let router = devnode::create_router(devnode::DevnodeState { ledger });
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("devnode server error")?;

    tracing::info!("devnode stopped");
    Ok(())
}

fn print_address(args: cli::AddressArgs) -> Result<()> {
    if args.generate {
        let credential = Credential::generate();
        println!("Address    : {}", credential.address());
        println!("Secret key : {}", credential.secret_hex());
        return Ok(());
    }

    let key = args.key.context("--key is required")?;
    let credential = Credential::from_hex(&key).context("invalid --key")?;
    println!("{}", credential.address());
    Ok(())
}

fn print_version() {
    println!("dropship    {}", env!("CARGO_PKG_VERSION"));
    println!("tx version  {}", TRANSACTION_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is never reported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
