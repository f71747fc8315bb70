use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use chrono::Utc;
use tokio::sync::mpsc;

use safetrader::api::create_router;
use safetrader::chain::{ChainSet, SafeWalletProvider, WalletProvider};
use safetrader::clients::{
    EventBus, HttpAggregator, HttpDirectory, HttpListingIndex, HttpPriceFeed, HttpTokenRegistry,
    NoopBus, PriceFeed, RouteProvider, TokenSource, WalletDirectory, WebhookBus,
};
use safetrader::config::AppConfig;
use safetrader::execution::orchestrator::{run_emission_consumer, OrchestratorPolicy};
use safetrader::execution::{
    run_workers, AllowanceManager, Orchestrator, PositionSizer, Scheduler, SizingPolicy,
    TradeExecutor, WalletValidator,
};
use safetrader::resolver::TokenResolver;
use safetrader::services::monitor::{run_monitor, Emission, MonitorCommand};
use safetrader::{metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls CryptoProvider");

    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    // --- Prometheus metrics ---
    let metrics_handle = metrics::init_metrics();
    tracing::info!("Prometheus metrics initialized");

    // --- Networks ---
    let chains = Arc::new(ChainSet::from_config(&config));
    if chains.is_empty() {
        tracing::warn!("No networks configured (NETWORKS_JSON) — signals will be rejected");
    }
    for key in chains.keys() {
        let handle = chains.handle(key).expect("key exists");
        match handle.rpc.chain_id().await {
            Ok(id) if id == handle.chain_id => {
                tracing::info!(network = %key, chain_id = id, "RPC reachable");
            }
            Ok(id) => {
                tracing::warn!(
                    network = %key,
                    expected = handle.chain_id,
                    reported = id,
                    "RPC chain id mismatch — check configuration"
                );
            }
            Err(e) => {
                tracing::warn!(network = %key, error = %e, "RPC unreachable at startup");
            }
        }
    }

    // --- Agent signer / wallet provider ---
    let http_timeout = Duration::from_secs(config.http_timeout_secs);
    let wallets: Option<Arc<dyn WalletProvider>> = match config.private_key.as_deref() {
        Some(pk) => match pk.parse::<PrivateKeySigner>() {
            Ok(signer) => {
                let provider = SafeWalletProvider::new(Arc::clone(&chains), signer);
                tracing::info!(
                    agent = %provider.signer_address(),
                    "Agent signer initialized"
                );
                Some(Arc::new(provider))
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid PRIVATE_KEY — falling back to monitor-only mode");
                None
            }
        },
        None => {
            tracing::warn!("No PRIVATE_KEY — running in monitor-only mode");
            None
        }
    };

    // --- Collaborator clients ---
    let directory: Arc<dyn WalletDirectory> =
        Arc::new(HttpDirectory::new(config.directory_url.clone(), http_timeout));
    let price_feed: Arc<dyn PriceFeed> =
        Arc::new(HttpPriceFeed::new(config.price_feed_url.clone(), http_timeout));
    let routes: Arc<dyn RouteProvider> =
        Arc::new(HttpAggregator::new(config.aggregator_url.clone(), http_timeout));
    let bus: Arc<dyn EventBus> = match config.event_bus_url.clone() {
        Some(url) => {
            tracing::info!(url = %url, "Event bus webhook enabled");
            Arc::new(WebhookBus::new(url, http_timeout))
        }
        None => {
            tracing::info!("No event bus configured — events dropped");
            Arc::new(NoopBus)
        }
    };

    let sources: Vec<Arc<dyn TokenSource>> = vec![
        Arc::new(HttpTokenRegistry::new(config.registry_url.clone(), http_timeout)),
        Arc::new(HttpListingIndex::new(config.listing_url.clone(), http_timeout)),
    ];
    let known = config
        .known_tokens
        .iter()
        .map(|t| t.to_binding())
        .collect();
    let resolver = TokenResolver::new(known, sources);

    // --- Pipeline components ---
    let sizer = PositionSizer::new(SizingPolicy::from_config(&config));
    let validator = match &wallets {
        Some(provider) => WalletValidator::new(Arc::clone(provider)),
        None => {
            // Monitor-only mode still validates wallets read-only through a
            // throwaway signer that never broadcasts.
            let signer = PrivateKeySigner::random();
            let provider: Arc<dyn WalletProvider> =
                Arc::new(SafeWalletProvider::new(Arc::clone(&chains), signer));
            WalletValidator::new(provider)
        }
    };

    let dry_run = config.dry_run || wallets.is_none();
    if dry_run {
        tracing::info!("Executor running in DRY-RUN mode");
    } else {
        tracing::info!("Executor running in LIVE mode");
    }
    let executor = TradeExecutor::new(
        Arc::clone(&chains),
        wallets.clone(),
        Arc::clone(&routes),
        AllowanceManager::default(),
        config.default_slippage_bps,
        dry_run,
    );

    let scheduler = Arc::new(Scheduler::new());
    let pause_flag = Arc::new(AtomicBool::new(false));

    let (monitor_tx, monitor_rx) = mpsc::channel::<MonitorCommand>(256);
    let (emission_tx, emission_rx) = mpsc::channel::<Emission>(256);

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&chains),
        directory,
        resolver,
        sizer,
        validator,
        executor,
        Arc::clone(&routes),
        bus,
        Arc::clone(&scheduler),
        monitor_tx,
        Arc::clone(&pause_flag),
        OrchestratorPolicy {
            tp1_exit_percent: config.tp1_exit_percent,
            trailing_enabled: config.trailing_stop_enabled,
            trailing_retracement_pct: config.trailing_retracement_pct,
        },
    ));

    // --- Position monitor ---
    {
        let feed = Arc::clone(&price_feed);
        let tick = Duration::from_secs(config.monitor_tick_seconds);
        tokio::spawn(async move {
            run_monitor(monitor_rx, emission_tx, feed, tick).await;
        });
        tracing::info!(
            interval = config.monitor_tick_seconds,
            "Position monitor spawned"
        );
    }

    // --- Emission consumer: monitor → scheduler ---
    {
        let orch = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            run_emission_consumer(orch, emission_rx).await;
        });
    }

    // --- Executor worker pool ---
    let workers = run_workers(Arc::clone(&orchestrator), config.executor_fan_out);
    tracing::info!(fan_out = config.executor_fan_out, "Execution workers spawned");

    // --- HTTP surface ---
    let state = AppState {
        config,
        orchestrator: Arc::clone(&orchestrator),
        metrics_handle,
        pause_flag,
        started_at: Utc::now(),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain in-flight executor calls best-effort; queued requests are
    // dropped and their trades marked for reconciliation.
    tracing::info!("Shutting down gracefully...");
    orchestrator.shutdown().await;
    for worker in workers {
        let _ = worker.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown...");
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
