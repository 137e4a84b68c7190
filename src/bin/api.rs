use handyman_booking_agent::{
    api::start_server,
    catalog::ExpertiseCatalog,
    classifier::{IntentClassifier, KeywordClassifier},
    clock::SystemClock,
    config::AppConfig,
    geo::GeoProximityIndex,
    nlu::NluClient,
    orchestrator::{BookingDefaults, BookingOrchestrator},
    store::{BookingStore, InMemoryBookingStore, PgBookingStore},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();

    info!("🚀 Handyman Booking Agent - API Server");
    info!("📍 Port: {}", config.port);

    let geo = GeoProximityIndex::load(&config.geo_dataset_path, config.proximity_radius_km);
    info!(towns = geo.len(), "Proximity index ready");

    let catalog = match config.expertise_catalog_path.as_deref() {
        Some(path) => ExpertiseCatalog::from_json_file(path)?,
        None => ExpertiseCatalog::default(),
    };
    info!(categories = catalog.len(), "Expertise catalog ready");

    let store: Arc<dyn BookingStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PgBookingStore::connect_lazy(url)?),
        None => Arc::new(InMemoryBookingStore::new()),
    };

    let classifier: Arc<dyn IntentClassifier> = match config.nlu_url.as_deref() {
        Some(url) => {
            info!("Using NLU server at {}", url);
            Arc::new(NluClient::new(url, config.nlu_timeout)?)
        }
        None => {
            warn!("Falling back to keyword classifier");
            Arc::new(KeywordClassifier)
        }
    };

    let orchestrator = Arc::new(BookingOrchestrator::new(
        store,
        classifier,
        Arc::new(catalog),
        Arc::new(geo),
        Arc::new(SystemClock),
        BookingDefaults::from(&config),
    ));

    info!("✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    start_server(orchestrator, config.port, config.session_idle_timeout).await?;

    Ok(())
}
