//! Request handling shared by the D-Bus interface: upload staging,
//! classification, album assignment and library access.

use albums_core::Taxonomy;
use albums_store::{
    allowed_file, sanitize_filename, AlbumEntry, ArchiveError, ClearReport, Library, LibraryError,
    OrganizeError, UploadRecord,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::engine::{EngineError, EngineHandle};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("no files selected")]
    NoFiles,
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("file organization failed: {0}")]
    Organization(#[from] OrganizeError),
    #[error("library: {0}")]
    Library(#[from] LibraryError),
    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Per-file result of an upload batch, serialized into the response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadOutcome {
    Filed(UploadRecord),
    Rejected { filename: String, error: String },
}

enum Slot {
    Filed(usize),
    Rejected { filename: String, error: String },
}

pub struct AlbumService {
    engine: EngineHandle,
    library: Library,
    taxonomy: &'static Taxonomy,
    max_upload_bytes: u64,
}

impl AlbumService {
    pub fn new(engine: EngineHandle, library: Library, max_upload_bytes: u64) -> Self {
        Self {
            engine,
            library,
            taxonomy: Taxonomy::builtin(),
            max_upload_bytes,
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Classify a batch of uploaded files and file them into albums.
    ///
    /// Files are processed one at a time. Unsupported extensions are
    /// skipped; oversized files are reported per file. An organization
    /// failure fails the whole batch (earlier copies stay on disk).
    pub async fn upload(&self, files: Vec<(String, Vec<u8>)>) -> Result<Vec<UploadOutcome>, ServiceError> {
        if files.is_empty() || files.iter().all(|(name, _)| name.is_empty()) {
            return Err(ServiceError::NoFiles);
        }
        self.library.ensure_root()?;

        let mut records = Vec::new();
        let mut slots = Vec::new();

        for (name, bytes) in files {
            if !allowed_file(&name) {
                tracing::debug!(filename = %name, "skipping file with unsupported extension");
                continue;
            }
            let filename = sanitize_filename(&name);
            if filename.is_empty() {
                tracing::debug!(filename = %name, "skipping file with unusable name");
                continue;
            }

            if bytes.len() as u64 > self.max_upload_bytes {
                tracing::warn!(filename = %filename, size = bytes.len(), "upload too large");
                slots.push(Slot::Rejected {
                    filename,
                    error: "File too large".to_string(),
                });
                continue;
            }

            let temp_path = self.library.root().join(&filename);
            if let Err(e) = std::fs::write(&temp_path, &bytes) {
                tracing::error!(filename = %filename, error = %e, "failed to stage upload");
                let _ = std::fs::remove_file(&temp_path);
                continue;
            }

            let classification = self.engine.classify(temp_path.clone()).await?;
            let albums = self.taxonomy.assign(&classification);
            tracing::info!(
                filename = %filename,
                albums = ?albums.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
                "classified upload"
            );

            slots.push(Slot::Filed(records.len()));
            records.push(UploadRecord::new(filename, temp_path, classification, albums));
        }

        self.library.organize(&mut records)?;

        let mut records: Vec<Option<UploadRecord>> = records.into_iter().map(Some).collect();
        Ok(slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Filed(i) => records[i].take().map(UploadOutcome::Filed),
                Slot::Rejected { filename, error } => Some(UploadOutcome::Rejected { filename, error }),
            })
            .collect())
    }

    pub fn list_albums(&self) -> Result<BTreeMap<String, Vec<AlbumEntry>>, ServiceError> {
        Ok(self.library.list()?)
    }

    pub fn fetch_image(&self, album: &str, filename: &str) -> Result<Vec<u8>, ServiceError> {
        self.library
            .fetch(album, filename)?
            .ok_or_else(|| ServiceError::NotFound(format!("{album}/{filename}")))
    }

    pub fn download_album(&self, album: &str) -> Result<Vec<u8>, ServiceError> {
        self.library
            .build_zip(album)?
            .ok_or_else(|| ServiceError::NotFound(format!("album {album}")))
    }

    pub fn clear(&self) -> ClearReport {
        self.library.clear()
    }
}
