use albums_store::Library;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod service;

const BUS_NAME: &str = "org.freedesktop.PhotoAlbums1";
const OBJECT_PATH: &str = "/org/freedesktop/PhotoAlbums1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("albumsd starting");

    let config = config::Config::from_env();
    tracing::info!(
        storage_root = %config.storage_root.display(),
        model_dir = %config.model_dir.display(),
        min_confidence = config.min_confidence,
        "configuration loaded"
    );

    let library = Library::new(&config.storage_root);
    library.ensure_root()?;

    let engine = engine::spawn_engine(&config)?;
    let service = service::AlbumService::new(engine, library, config.max_upload_bytes);

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, dbus_interface::PhotoAlbumsService::new(service))?
        .build()
        .await?;

    tracing::info!(bus_name = BUS_NAME, "albumsd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("albumsd shutting down");

    Ok(())
}
