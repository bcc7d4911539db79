//! Album library rooted at a storage directory.

use crate::archive::{self, ArchiveError};
use crate::organizer::{self, OrganizeError, UploadRecord};
use crate::sanitize::{allowed_file, sanitize_filename};
use albums_core::AlbumName;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> LibraryError + '_ {
    move |source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One image listed in an album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumEntry {
    pub filename: String,
    pub url: String,
}

/// Outcome of [`Library::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub removed: usize,
    pub failed: usize,
}

impl ClearReport {
    /// True when every entry under the root was removed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// The storage root and the album directories beneath it.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it is missing.
    pub fn ensure_root(&self) -> Result<(), LibraryError> {
        std::fs::create_dir_all(&self.root).map_err(io_at(&self.root))
    }

    /// Every album directory directly under the root, with its image files.
    ///
    /// Loose files at the root (staged uploads) are not albums and are skipped.
    pub fn list(&self) -> Result<BTreeMap<String, Vec<AlbumEntry>>, LibraryError> {
        let mut albums = BTreeMap::new();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(albums),
            Err(e) => return Err(io_at(&self.root)(e)),
        };

        for entry in entries {
            let entry = entry.map_err(io_at(&self.root))?;
            let path = entry.path();
            if !entry.file_type().map_err(io_at(&path))?.is_dir() {
                continue;
            }
            let Some(album) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %path.display(), "skipping album with non-UTF-8 name");
                continue;
            };

            let album_name = AlbumName::new(album.clone());
            let mut files = Vec::new();
            for file in std::fs::read_dir(&path).map_err(io_at(&path))? {
                let file = file.map_err(io_at(&path))?;
                if !file.file_type().map_err(io_at(&file.path()))?.is_file() {
                    continue;
                }
                if let Some(filename) = file.file_name().to_str() {
                    if allowed_file(filename) {
                        files.push(AlbumEntry {
                            filename: filename.to_string(),
                            url: organizer::public_path(&album_name, filename),
                        });
                    }
                }
            }
            files.sort_by(|a, b| a.filename.cmp(&b.filename));
            albums.insert(album, files);
        }

        Ok(albums)
    }

    /// Path of a stored image, if it exists. Both components are sanitized.
    pub fn image_path(&self, album: &str, filename: &str) -> Option<PathBuf> {
        let album = sanitize_filename(album);
        let filename = sanitize_filename(filename);
        if album.is_empty() || filename.is_empty() {
            return None;
        }
        let path = self.root.join(album).join(filename);
        path.is_file().then_some(path)
    }

    /// Read a stored image. `Ok(None)` if the album or file does not exist.
    pub fn fetch(&self, album: &str, filename: &str) -> Result<Option<Vec<u8>>, LibraryError> {
        match self.image_path(album, filename) {
            Some(path) => std::fs::read(&path).map(Some).map_err(io_at(&path)),
            None => {
                tracing::debug!(album, filename, "image not found");
                Ok(None)
            }
        }
    }

    /// File staged uploads into their albums. See [`organizer::organize`]
    /// for the (non-transactional) failure semantics.
    pub fn organize(&self, records: &mut [UploadRecord]) -> Result<(), OrganizeError> {
        organizer::organize(&self.root, records)
    }

    /// Zip an album. `Ok(None)` if it does not exist.
    pub fn build_zip(&self, album: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let album = sanitize_filename(album);
        if album.is_empty() {
            return Ok(None);
        }
        archive::build_zip(&self.root, &album)
    }

    /// Delete everything under the root, then recreate it empty.
    ///
    /// Best effort: a failure on one entry is logged and counted, and the
    /// remaining entries are still removed. Irreversible.
    pub fn clear(&self) -> ClearReport {
        let mut report = ClearReport::default();

        match std::fs::read_dir(&self.root) {
            Ok(entries) => {
                for entry in entries {
                    let path = match entry {
                        Ok(entry) => entry.path(),
                        Err(e) => {
                            tracing::error!(root = %self.root.display(), error = %e, "failed to read entry");
                            report.failed += 1;
                            continue;
                        }
                    };
                    match remove_entry(&path) {
                        Ok(()) => report.removed += 1,
                        Err(e) => {
                            tracing::error!(path = %path.display(), error = %e, "failed to delete");
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(root = %self.root.display(), error = %e, "failed to read storage root");
                report.failed += 1;
            }
        }

        if let Err(e) = self.ensure_root() {
            tracing::error!(error = %e, "failed to recreate storage root");
            report.failed += 1;
        }

        tracing::info!(removed = report.removed, failed = report.failed, "library cleared");
        report
    }
}

/// Remove a file, a symlink (not its target) or a whole directory tree.
fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
