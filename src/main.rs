use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod clock;
mod config;
mod error;
mod forecast;
mod geocode;
mod rate_limit;
mod routes;
mod utils;

use clock::system_clock;
use config::Config;
use forecast::MetGateway;
use geocode::GeocoderGateway;
use routes::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "met_weather_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.met.user_agent.is_none() {
        tracing::warn!("MET_USER_AGENT is not set; forecast requests will fail until it is");
    }
    if config.geocoder.user_agent.is_none() {
        tracing::warn!("GEOCODER_USER_AGENT is not set; geocoding requests will fail until it is");
    }

    let clock = system_clock();
    let met = Arc::new(MetGateway::new(&config.met, config.cache_max_entries, clock.clone())?);
    let geocoder = Arc::new(GeocoderGateway::new(
        &config.geocoder,
        config.cache_max_entries,
        clock,
    )?);

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        met,
        geocoder,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
