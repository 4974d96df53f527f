//! DoorList
//!
//! Main application entry point

use tracing::{error, info};

use DoorList::{
    config::Settings,
    database::connection::{create_pool, run_migrations},
    services::ServiceFactory,
    utils::logging,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    settings.validate()?;

    // Initialize logging. The guard flushes the rolling file writer on drop.
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", DoorList::info());

    // Initialize database connection
    info!("Connecting to database...");
    let db_pool = create_pool(&settings.database).await?;

    run_migrations(&db_pool).await?;

    // Wire the engine
    info!("Initializing services...");
    let services = ServiceFactory::new(db_pool, settings)?;

    // Recover entries stranded mid-flight by a previous run before any new
    // drain pass can claim them.
    let processor = services.processor();
    processor.recover().await?;

    // Spin up one actor per stored session, counters recounted from the
    // check-in ledger.
    services.seed_sessions().await?;

    let health = services.health_check().await;
    if !health.is_healthy() {
        for issue in health.get_issues() {
            error!(issue = %issue, "Startup health check issue");
        }
        return Err("startup health check failed".into());
    }
    info!(
        live_sessions = health.live_sessions,
        "DoorList engine is ready"
    );

    let handle = processor.spawn();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Stop the drain loop first so no entry is claimed while the session
    // actors wind down.
    handle.shutdown().await;
    services.store.shutdown().await;

    info!("DoorList has been shut down.");
    Ok(())
}
