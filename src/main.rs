use anyhow::{Context, Result};
use bandbot::api::{BinanceFuturesClient, MarketDataProvider, OrderGateway};
use bandbot::config::Settings;
use bandbot::execution::{CycleOutcome, PositionManager, StartupCheck, TradingCycle};
use bandbot::persistence::{JsonFileStore, RedisStateStore, StateStore};
use bandbot::strategy::BandTouchStrategy;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bandbot", version, about = "Bollinger band touch bot for BTC perpetual futures")]
struct Cli {
    /// Config file (defaults to ./config.{json,toml,yaml} when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run a cycle at the configured minute of every hour (default)
    Run,
    /// Run a single cycle now and exit
    Once,
    /// Show the stored position alongside the exchange's view
    Status,
    /// Cancel all orders, close any long and mark the record FLAT
    Flatten,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    let client = Arc::new(create_exchange_client(&settings)?);
    let store = open_state_store(&settings).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_scheduled(settings, client, store).await,
        Command::Once => run_single(settings, client, store).await,
        Command::Status => show_status(settings, client, store).await,
        Command::Flatten => flatten(settings, client, store).await,
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bandbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_exchange_client(settings: &Settings) -> Result<BinanceFuturesClient> {
    let client = BinanceFuturesClient::new(settings.credentials(), settings.symbol.clone())?
        .with_candle_retry(settings.candle_retry());

    Ok(if settings.testnet {
        tracing::warn!("Using Binance futures TESTNET");
        client.testnet()
    } else {
        client
    })
}

async fn open_state_store(settings: &Settings) -> Result<Arc<dyn StateStore>> {
    match &settings.redis_url {
        Some(url) => {
            let store = RedisStateStore::new(url, &settings.symbol)
                .await
                .context("Failed to connect to Redis")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(JsonFileStore::new(settings.state_file.clone()))),
    }
}

async fn restore_manager(
    settings: &Settings,
    client: &Arc<BinanceFuturesClient>,
    store: Arc<dyn StateStore>,
) -> Result<PositionManager> {
    tracing::info!(store = %store.describe(), "Loading position state");
    let gateway: Arc<dyn OrderGateway> = client.clone();
    PositionManager::restore(gateway, store, settings.exit_policy())
        .await
        .context("Failed to load position state")
}

async fn build_cycle(
    settings: &Settings,
    client: &Arc<BinanceFuturesClient>,
    store: Arc<dyn StateStore>,
) -> Result<TradingCycle> {
    let manager = restore_manager(settings, client, store).await?;
    let market_data: Arc<dyn MarketDataProvider> = client.clone();
    let gateway: Arc<dyn OrderGateway> = client.clone();

    Ok(TradingCycle::new(
        manager,
        market_data,
        gateway,
        Box::new(BandTouchStrategy::new(settings.band_config())),
        settings.sizer(),
        settings.market(),
    ))
}

/// Leverage and store/exchange consistency, both best-effort
async fn prepare_exchange(
    settings: &Settings,
    client: &BinanceFuturesClient,
    cycle: &mut TradingCycle,
) {
    match client.set_leverage(settings.leverage).await {
        Ok(applied) if applied != settings.leverage => {
            tracing::warn!("Requested {}x leverage, exchange applied {}x", settings.leverage, applied)
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not set leverage: {}", e),
    }

    match cycle.manager_mut().check_exchange_consistency().await {
        Ok(StartupCheck::UntrackedExchangePosition { amount }) => {
            tracing::error!("🚨 Untracked position of {} on the exchange, trading paused", amount)
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not verify exchange position at startup: {}", e),
    }
}

fn log_settings(settings: &Settings) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({})", settings.symbol, settings.interval);
    tracing::info!("  Trading capital: ${:.2}", settings.trading_capital);
    tracing::info!("  Leverage: {}x", settings.leverage);
    tracing::info!(
        "  Bollinger Bands: period={}, std={}",
        settings.bollinger_period,
        settings.bollinger_std
    );
    tracing::info!("  Min band width: ${}", settings.min_bollinger_width);
    tracing::info!("  Stop loss: ${}", settings.stop_loss_points);
    if settings.use_upper_band_exit {
        tracing::info!("  Target: upper band");
    } else {
        tracing::info!("  Target: entry + ${}", settings.take_profit_points);
    }
    if settings.use_trailing_stop {
        tracing::info!("  Trailing stop: enabled");
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_scheduled(
    settings: Settings,
    client: Arc<BinanceFuturesClient>,
    store: Arc<dyn StateStore>,
) -> Result<()> {
    tracing::info!("🚀 bandbot starting");
    log_settings(&settings);

    let mut cycle = build_cycle(&settings, &client, store).await?;
    prepare_exchange(&settings, &client, &mut cycle).await;

    let schedule = settings.schedule();
    tracing::info!(
        "Bot will run checks at minute {} of every hour (UTC{:+}h{:02})",
        schedule.check_minute,
        schedule.utc_offset_minutes / 60,
        (schedule.utc_offset_minutes % 60).abs()
    );
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut ticker = schedule.ticker();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                tracing::info!("⏰ Scheduled check at {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
                run_cycle(&mut cycle).await;
                tracing::info!("Next check at {} UTC", schedule.next_after(Utc::now()).format("%H:%M:%S"));
            }
        }
    }

    tracing::info!("👋 bandbot stopped");
    Ok(())
}

async fn run_single(
    settings: Settings,
    client: Arc<BinanceFuturesClient>,
    store: Arc<dyn StateStore>,
) -> Result<()> {
    log_settings(&settings);
    let mut cycle = build_cycle(&settings, &client, store).await?;
    prepare_exchange(&settings, &client, &mut cycle).await;
    run_cycle(&mut cycle).await;
    Ok(())
}

/// Run one cycle; failures are logged and never end the process
async fn run_cycle(cycle: &mut TradingCycle) {
    match cycle.run_once().await {
        Ok(CycleOutcome::Entered(position)) => tracing::info!(
            "✅ Entered long {} @ ${:.1} (stop #{:?}, target #{:?})",
            position.quantity,
            position.entry_price,
            position.stop_loss_order_id,
            position.target_order_id
        ),
        Ok(CycleOutcome::InsufficientData { got, needed }) => {
            tracing::warn!("Cycle skipped: {} of {} candles", got, needed)
        }
        Ok(outcome) => tracing::debug!(?outcome, "Cycle complete"),
        Err(e) => tracing::error!("❌ Trading cycle failed: {}", e),
    }
}

async fn show_status(
    settings: Settings,
    client: Arc<BinanceFuturesClient>,
    store: Arc<dyn StateStore>,
) -> Result<()> {
    let manager = restore_manager(&settings, &client, store).await?;
    let position = manager.position();

    if position.in_trade {
        tracing::info!(
            "📈 IN POSITION: {} {} @ ${:.1} since {}",
            position.quantity,
            settings.symbol,
            position.entry_price,
            position
                .entry_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        );
        tracing::info!(
            "  Stop #{:?} @ ${:.1} | Target #{:?} @ ${:.1}",
            position.stop_loss_order_id,
            position.stop_loss_price,
            position.target_order_id,
            position.target_price
        );
    } else {
        tracing::info!("FLAT (last exit: {:?})", position.exit_reason);
    }

    let open_orders = client.list_open_orders().await?;
    let amount = client.get_position_amount().await?;
    let price = client.get_current_price().await?;

    tracing::info!("Exchange: position {} | open orders {:?} | price ${:.1}", amount, open_orders, price);
    Ok(())
}

async fn flatten(
    settings: Settings,
    client: Arc<BinanceFuturesClient>,
    store: Arc<dyn StateStore>,
) -> Result<()> {
    let mut manager = restore_manager(&settings, &client, store).await?;
    manager
        .emergency_flatten()
        .await
        .context("Emergency flatten failed, check the exchange manually")?;
    Ok(())
}
