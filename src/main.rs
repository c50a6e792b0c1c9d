//! Funding Arb - Main Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use funding_arb::alert::{AlertSink, LogAlertSink};
use funding_arb::config::Config;
use funding_arb::exchange::{BitgetClient, Execution, MarketData, MockExecution};
use funding_arb::runner::RunLoop;
use funding_arb::strategy::FundingArbStrategy;
use funding_arb::utils::decimal::to_basis_points;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Funding Arb CLI
#[derive(Parser)]
#[command(name = "funding-arb")]
#[command(version, about = "Delta-neutral funding rate arbitrage on Bitget")]
struct Cli {
    /// Simulate execution fills instead of sending real orders
    #[arg(long)]
    paper: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single tick and exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    info!("╔════════════════════════════════════════════════════╗");
    info!(
        "║        Funding Arb v{} - Bitget                 ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════╝");

    // Load and validate configuration; failures here are fatal
    let mut config = Config::load()?;
    apply_credential_fallbacks(&mut config);
    config.validate()?;

    let paper = cli.paper || std::env::var("PAPER_TRADING").unwrap_or_default() == "true";
    if paper {
        info!("📝 PAPER TRADING MODE - execution fills are simulated");
    } else {
        config.validate_credentials()?;
        warn!("⚠️  LIVE TRADING MODE - real orders will be placed");
    }

    log_config(&config);

    // The Bitget client serves market data in both modes; only live mode
    // routes orders to it
    let client = Arc::new(BitgetClient::new(&config.bitget)?);
    let market: Arc<dyn MarketData> = client.clone();
    let execution: Arc<dyn Execution> = if paper {
        Arc::new(MockExecution::paper())
    } else {
        client
    };
    let alerts: Arc<dyn AlertSink> = Arc::new(LogAlertSink);

    // Shutdown signal
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        stop_clone.store(true, Ordering::SeqCst);
    });

    let mut strategy = FundingArbStrategy::new(&config, market, execution, alerts, stop.clone());

    match cli.command {
        Some(Commands::Once) => {
            info!("Single-shot evaluation");
            strategy.tick().await?;
            info!(position = ?strategy.position().state, "Tick complete");
            Ok(())
        }
        None => {
            info!("🚀 Starting trading loop...");
            let mut run_loop = RunLoop::new(
                strategy,
                Duration::from_secs(config.execution.poll_interval_secs),
                stop,
            );
            run_loop.run().await
        }
    }
}

/// Accept the bare env names the original deployment used alongside the
/// prefixed form.
fn apply_credential_fallbacks(config: &mut Config) {
    if config.bitget.api_key.is_empty() {
        if let Ok(key) = std::env::var("BITGET_API_KEY") {
            config.bitget.api_key = key;
        }
    }
    if config.bitget.api_secret.is_empty() {
        if let Ok(secret) = std::env::var("BITGET_API_SECRET") {
            config.bitget.api_secret = secret;
        }
    }
    if config.bitget.api_passphrase.is_empty() {
        if let Ok(passphrase) = std::env::var("BITGET_API_PASSPHRASE") {
            config.bitget.api_passphrase = passphrase;
        }
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "funding-arb.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funding_arb=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup. Credentials are never logged.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Spot symbol: {}", config.pair.spot_symbol);
    info!("   Perp symbol: {}", config.pair.perp_symbol);
    info!(
        "   Funding threshold: {} bps per interval",
        to_basis_points(config.pair.funding_threshold)
    );
    info!("   Target notional: ${}", config.pair.target_notional_usd);
    info!(
        "   Poll interval: {}s | Call timeout: {}s | Fill polls: {}",
        config.execution.poll_interval_secs,
        config.execution.call_timeout_secs,
        config.execution.max_fill_polls
    );
    info!("   Max hold: {}h", config.execution.max_hold_hours);
}
