//! # yualan-reconciler
//!
//! Settles gateway payments for Yualan sales.
//!
//! ## Commands
//! ```text
//! yualan-reconciler [--config PATH] check-pending [--limit N] [--hours H] [--provider P]
//! yualan-reconciler [--config PATH] serve
//! yualan-reconciler [--config PATH] migrate
//! yualan-reconciler [--config PATH] config
//! yualan-reconciler [--config PATH] refund SALE_ID [--amount 10000.00]
//! ```
//!
//! `serve` runs every configured schedule plus the webhook server until
//! Ctrl-C or SIGTERM. `check-pending` runs one batch per provider and prints
//! the summary.

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use yualan_core::{Money, PaymentMethod, TriggerOrigin};
use yualan_db::Database;
use yualan_gateway::{GatewayFactory, TenantGatewayFactory};
use yualan_reconcile::{
    BatchSummary, EngineSettings, PaymentRefunder, ReconcilerConfig, ReconciliationEngine, Scheduler,
    WebhookIngestor,
};

use crate::server::AppState;

#[derive(Debug, Parser)]
#[command(name = "yualan-reconciler", version, about = "Reconciles gateway payments for Yualan sales")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one reconciliation batch and print the summary
    CheckPending {
        /// Most sales checked per provider
        #[arg(long)]
        limit: Option<u32>,

        /// Only sales created within this many hours
        #[arg(long)]
        hours: Option<u32>,

        /// Only this provider (ipaymu or midtrans)
        #[arg(long)]
        provider: Option<PaymentMethod>,
    },

    /// Run the schedules and the webhook server until interrupted
    Serve,

    /// Apply database migrations and exit
    Migrate,

    /// Print the effective configuration
    Config,

    /// Refund a completed sale through its gateway
    Refund {
        sale_id: String,

        /// Amount to refund, e.g. 10000.00 (defaults to the settled amount)
        #[arg(long, value_parser = parse_amount)]
        amount: Option<Money>,
    },
}

fn parse_amount(text: &str) -> Result<Money, String> {
    Money::parse_decimal(text)
        .filter(|amount| amount.is_positive())
        .ok_or_else(|| format!("'{text}' is not a positive amount"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,yualan=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = ReconcilerConfig::load(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::CheckPending {
            limit,
            hours,
            provider,
        } => check_pending(&config, limit, hours, provider).await,
        Command::Serve => serve(&config).await,
        Command::Migrate => migrate(&config).await,
        Command::Config => {
            let mut printable = config.clone();
            if printable.ipaymu.api_key.is_some() {
                printable.ipaymu.api_key = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&printable)?);
            Ok(())
        }
        Command::Refund { sale_id, amount } => refund(&config, &sale_id, amount).await,
    }
}

async fn open_database(config: &ReconcilerConfig) -> anyhow::Result<Database> {
    Database::new(config.database.db_config())
        .await
        .with_context(|| format!("opening database {}", config.database.path.display()))
}

fn gateway_factory(config: &ReconcilerConfig) -> anyhow::Result<Arc<dyn GatewayFactory>> {
    let factory = TenantGatewayFactory::new(config.gateway.timeout(), config.ipaymu.platform())?;
    Ok(Arc::new(factory))
}

fn engines(
    config: &ReconcilerConfig,
    db: &Database,
    gateways: &Arc<dyn GatewayFactory>,
    only: Option<PaymentMethod>,
) -> Vec<ReconciliationEngine> {
    config
        .enabled_providers()
        .into_iter()
        .filter(|provider| only.map_or(true, |p| p == *provider))
        .map(|provider| {
            ReconciliationEngine::new(
                db.clone(),
                gateways.clone(),
                provider,
                EngineSettings::from(&config.gateway),
            )
        })
        .collect()
}

async fn check_pending(
    config: &ReconcilerConfig,
    limit: Option<u32>,
    hours: Option<u32>,
    provider: Option<PaymentMethod>,
) -> anyhow::Result<()> {
    let default_schedule = config.schedules.first();
    let limit = limit.or(default_schedule.map(|s| s.limit)).unwrap_or(100);
    let hours = hours.or(default_schedule.map(|s| s.hours)).unwrap_or(24);

    let db = open_database(config).await?;
    let gateways = gateway_factory(config)?;
    let engines: Vec<ReconciliationEngine> = engines(config, &db, &gateways, provider)
        .into_iter()
        .map(|engine| engine.with_origin(TriggerOrigin::Manual))
        .collect();
    if engines.is_empty() {
        anyhow::bail!("no enabled provider matches the request");
    }

    println!("Checking up to {limit} sales from the last {hours} hours");
    let mut total = BatchSummary::default();
    for engine in &engines {
        let summary = engine.run_batch(limit, hours).await;
        println!("  {summary}");
        total.merge(&summary);
    }
    if engines.len() > 1 {
        println!("Total: {total}");
    }

    db.close().await;

    if let Some(err) = total.selection_error {
        anyhow::bail!("sale selection failed: {err}");
    }
    Ok(())
}

async fn serve(config: &ReconcilerConfig) -> anyhow::Result<()> {
    let db = open_database(config).await?;
    let gateways = gateway_factory(config)?;

    let scheduler = Scheduler::start(&config.schedules, &engines(config, &db, &gateways, None));
    info!(
        schedules = config.schedules.len(),
        providers = ?config.enabled_providers(),
        "Reconciliation schedules started"
    );

    let state = AppState {
        db: db.clone(),
        ingestor: WebhookIngestor::new(db.clone(), gateways, EngineSettings::from(&config.gateway)),
    };
    let served = server::serve(&config.server.bind_address(), state, shutdown_signal()).await;

    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "Schedules did not stop cleanly");
    }
    db.close().await;

    served
}

async fn migrate(config: &ReconcilerConfig) -> anyhow::Result<()> {
    let db = Database::new(config.database.db_config().run_migrations(false))
        .await
        .context("opening database")?;
    db.run_migrations().await?;
    db.close().await;
    println!("Migrations applied to {}", config.database.path.display());
    Ok(())
}

async fn refund(config: &ReconcilerConfig, sale_id: &str, amount: Option<Money>) -> anyhow::Result<()> {
    let db = open_database(config).await?;
    let refunder = PaymentRefunder::new(db.clone(), gateway_factory(config)?, config.gateway.timeout());

    let result = refunder.refund(sale_id, amount).await;
    db.close().await;

    let receipt = result.with_context(|| format!("refunding sale {sale_id}"))?;
    println!(
        "Refunded {} of sale {} (TRX ID: {})",
        receipt.amount, receipt.sale_id, receipt.transaction_id
    );
    println!("{}", serde_json::to_string_pretty(&receipt.response)?);
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
