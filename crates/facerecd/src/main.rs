use anyhow::{Context, Result};
use facerec_core::{Annotator, OnnxFaceAnalyzer};
use facerec_service::{FaceService, ServiceSettings};
use facerec_store::{FaceStore, SqliteFaceStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facerecd starting");

    let config = Config::from_env()?;

    let analyzer = OnnxFaceAnalyzer::load(config.model_pack, &config.model_dir, config.execution_provider)
        .context("failed to load face models")?;

    let store = SqliteFaceStore::open(config.store.clone()).context("failed to open face store")?;
    let registered = store.count().context("failed to count registered faces")?;
    tracing::info!(
        collection = %config.store.collection_name,
        registered,
        "face store ready"
    );

    let annotator = Annotator::discover(config.font_path.as_deref());

    let service = FaceService::new(
        analyzer,
        store,
        annotator,
        ServiceSettings {
            admin_password: config.admin_password.clone(),
            similarity_threshold: config.similarity_threshold,
        },
    );
    let engine = engine::spawn_engine(service)?;

    let state = Arc::new(http::AppState::new(
        engine,
        http::UiSettings::new(config.stream_interval, config.similarity_threshold),
    ));
    http::serve(config.bind_addr, state).await?;

    tracing::info!("facerecd stopped");
    Ok(())
}

