use zbus::interface;

use crate::service::{AlbumService, ServiceError};

/// D-Bus interface for the photo albums daemon.
///
/// Bus name: org.freedesktop.PhotoAlbums1
/// Object path: /org/freedesktop/PhotoAlbums1
pub struct PhotoAlbumsService {
    service: AlbumService,
}

impl PhotoAlbumsService {
    pub fn new(service: AlbumService) -> Self {
        Self { service }
    }
}

fn to_fdo(err: ServiceError) -> zbus::fdo::Error {
    match err {
        ServiceError::NoFiles => zbus::fdo::Error::InvalidArgs(err.to_string()),
        ServiceError::NotFound(what) => zbus::fdo::Error::FileNotFound(what),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.freedesktop.PhotoAlbums1")]
impl PhotoAlbumsService {
    /// Classify and file a batch of `(filename, bytes)` uploads.
    /// Returns a JSON array with one entry per accepted file.
    async fn upload(&self, files: Vec<(String, Vec<u8>)>) -> zbus::fdo::Result<String> {
        tracing::info!(count = files.len(), "upload requested");
        let outcomes = self.service.upload(files).await.map_err(|e| {
            tracing::error!(error = %e, "upload failed");
            to_fdo(e)
        })?;
        to_json(&outcomes)
    }

    /// JSON object mapping album name to `[{filename, url}]`.
    async fn list_albums(&self) -> zbus::fdo::Result<String> {
        tracing::debug!("list_albums requested");
        let albums = self.service.list_albums().map_err(to_fdo)?;
        to_json(&albums)
    }

    /// Raw bytes of one stored image.
    async fn fetch_image(&self, album: &str, filename: &str) -> zbus::fdo::Result<Vec<u8>> {
        tracing::debug!(album, filename, "fetch_image requested");
        self.service.fetch_image(album, filename).map_err(to_fdo)
    }

    /// Zip archive of a whole album.
    async fn download_album(&self, album: &str) -> zbus::fdo::Result<Vec<u8>> {
        tracing::info!(album, "download_album requested");
        self.service.download_album(album).map_err(|e| {
            tracing::warn!(album, error = %e, "download failed");
            to_fdo(e)
        })
    }

    /// Delete every album and staged file. Irreversible.
    async fn clear(&self) -> zbus::fdo::Result<String> {
        tracing::warn!("clear requested");
        let report = self.service.clear();
        Ok(serde_json::json!({
            "success": report.is_complete(),
            "removed": report.removed,
            "failed": report.failed,
        })
        .to_string())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let albums = self.service.list_albums().map(|a| a.len()).unwrap_or(0);
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "storage_root": self.service.library().root().display().to_string(),
            "albums": albums,
            "models_loaded": true,
        })
        .to_string())
    }
}
