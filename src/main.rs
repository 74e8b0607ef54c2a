//! Service binary: load config, wire the engine, run the poller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use replygate::autoreply::{AutoReplyEngine, Classifier, DedupLedger};
use replygate::config::{default_config_path, LoggingConfig, ServiceConfig};
use replygate::gateway::http::{ChatApiCredentials, HttpGateway};
use replygate::llm::HttpReplyGenerator;
use replygate::poller;

#[derive(Debug, Parser)]
#[command(
    name = "replygate",
    about = "Auto-reply dispatch service for WhatsApp automation"
)]
struct Args {
    /// Path to the config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single cycle, print the summary as JSON, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = ServiceConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    init_tracing(&config.logging);

    let engine = Arc::new(build_engine(&config)?);

    if args.once {
        let summary = engine.run_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if !config.autoreply.enabled {
        anyhow::bail!("autoreply.enabled is false; nothing to run");
    }

    let interval = Duration::from_secs(config.autoreply.poll_interval_secs);
    tracing::info!(
        connector = %config.connector_id,
        interval_secs = config.autoreply.poll_interval_secs,
        "starting auto-reply poller"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poller = tokio::spawn(poller::poll_loop(engine, interval, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    poller.await.context("poller task panicked")?;

    Ok(())
}

fn build_engine(config: &ServiceConfig) -> anyhow::Result<AutoReplyEngine> {
    let rules = config.rule_set()?;
    let gateway = HttpGateway::new(
        &config.connector_id,
        &config.platform.base_url,
        &config.platform.api_key,
        ChatApiCredentials {
            api_key: config.messaging.api_key.clone(),
            subdomain: config.messaging.subdomain.clone(),
            port: config.messaging.port,
            account_id: config.messaging.account_id.clone(),
        },
        Duration::from_secs(config.autoreply.send_timeout_secs),
    )?;

    let mut engine = AutoReplyEngine::new(
        &config.connector_id,
        Classifier::new(rules),
        DedupLedger::new(config.autoreply.ledger_capacity),
        Arc::new(gateway),
    )
    .with_message_lookback(config.autoreply.message_lookback);

    if config.llm.enabled {
        let generator = HttpReplyGenerator::new(
            &config.platform.base_url,
            &config.platform.api_key,
            &config.llm.model,
            Duration::from_secs(config.llm.timeout_secs),
        )?;
        engine = engine.with_generator(Arc::new(generator));
    }

    Ok(engine)
}

fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
