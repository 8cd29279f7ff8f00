use std::error::Error;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use transit_server::config::{AppConfig, api_key_from_env};
use transit_server::dataset::{DatasetRefreshCoordinator, GtfsImporter};
use transit_server::realtime::{FeedClient, FeedSnapshot, RealtimeCache};
use transit_server::schedule::{DatasetGeneration, ScheduleRepository};
use transit_server::scheduler::PeriodicTask;
use transit_server::web::{AppState, create_router};

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env();
    init_logging(config.as_ref().is_ok_and(|c| c.verbose));
    let config = config?;

    // Without the feed credential nothing useful can be served
    let api_key = api_key_from_env()?;

    // Bring the static dataset up to date before opening it
    let generation = DatasetGeneration::new();
    let coordinator = Arc::new(DatasetRefreshCoordinator::new(
        config.coordinator_config(),
        GtfsImporter::new(),
        generation.clone(),
    ));
    coordinator.run().await;

    PeriodicTask::new("dataset-refresh", config.dataset.check_interval()).spawn(move || {
        let coordinator = coordinator.clone();
        async move {
            coordinator.run().await;
        }
    });

    let schedule = Arc::new(ScheduleRepository::open(config.repository_config(), generation).await?);
    let directory = schedule.route_directory().await?;
    info!(routes = directory.len(), "set route lookup table");

    let client = FeedClient::new(config.realtime.client_config(api_key))?;
    let realtime = Arc::new(RealtimeCache::new(
        client,
        FeedSnapshot::new(&config.realtime.snapshot_path),
    ));
    realtime.bootstrap().await;

    // Fetch once now; periodic polling waits out the provider's rate limit
    let startup = realtime.clone();
    tokio::spawn(async move {
        // Failures are logged and recorded by the cache
        let _ = startup.refresh().await;
    });

    let polling = realtime.clone();
    PeriodicTask::new("realtime-refresh", config.realtime.period())
        .with_initial_delay(config.realtime.warmup())
        .spawn(move || {
            let cache = polling.clone();
            async move {
                let _ = cache.refresh().await;
            }
        });

    let app = create_router(AppState::new(schedule, realtime));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "departures server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
