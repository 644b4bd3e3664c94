mod aggregate;
mod config;
mod error;
mod handlers;
mod models;
mod protocol;
mod reference;
mod store;
mod sync;

use config::Config;
use error::Result;
use log::{error, info};
use std::sync::Arc;
use store::ResultStore;
use sync::SyncService;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;

    // Reference data is loaded once; results live only as long as the process.
    let districts = reference::load_districts(&config.districts_path);
    info!(
        "Loaded {} district(s) from {}",
        districts.len(),
        config.districts_path.display()
    );

    let service = Arc::new(SyncService::new(districts, ResultStore::new()));
    let app = handlers::router(service);

    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!("Server is running on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
