use anyhow::{Context, Result};
use facecheck_core::{SeetaFaceLocator, Settings, Verifier};
use tracing_subscriber::EnvFilter;

mod dbus_interface;
mod engine;

use dbus_interface::{DaemonStatus, FaceCheckService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facecheckd starting");

    let settings = Settings::load(None).context("failed to load configuration")?;

    let store = settings
        .open_store()
        .context("failed to open feature store")?;
    tracing::info!(backend = ?settings.store, "feature store opened");

    let locator = SeetaFaceLocator::load(&settings.model_path, settings.locator.clone())
        .context("failed to load face detector")?;
    tracing::info!(model = %settings.model_path.display(), "face detector loaded");

    let verifier = Verifier::new(Box::new(locator), store, &settings.verifier);
    let engine = engine::spawn_engine(verifier).context("failed to spawn engine thread")?;

    let service = FaceCheckService {
        engine,
        status: DaemonStatus::from_settings(&settings),
    };

    let builder = if settings.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(
        bus = if settings.session_bus { "session" } else { "system" },
        name = BUS_NAME,
        "facecheckd ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("facecheckd shutting down");

    Ok(())
}
