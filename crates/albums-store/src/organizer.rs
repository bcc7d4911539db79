//! Files classified uploads into their album directories.

use albums_core::{AlbumName, ClassificationResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// URL prefix under which stored images are addressed.
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error("failed to file {filename} into album {album}: {source}")]
    Io {
        filename: String,
        album: String,
        #[source]
        source: io::Error,
    },
}

/// One uploaded image on its way into the library.
#[derive(Debug, Clone, Serialize)]
pub struct UploadRecord {
    pub filename: String,
    /// Staged upload. Removed and cleared once the record is organized.
    #[serde(skip)]
    pub temp_path: Option<PathBuf>,
    #[serde(rename = "predictions")]
    pub classification: ClassificationResult,
    pub albums: BTreeSet<AlbumName>,
    #[serde(rename = "paths")]
    pub public_paths: BTreeMap<AlbumName, String>,
}

impl UploadRecord {
    pub fn new(
        filename: impl Into<String>,
        temp_path: PathBuf,
        classification: ClassificationResult,
        albums: BTreeSet<AlbumName>,
    ) -> Self {
        Self {
            filename: filename.into(),
            temp_path: Some(temp_path),
            classification,
            albums,
            public_paths: BTreeMap::new(),
        }
    }
}

/// Public URL of `filename` inside `album`.
pub fn public_path(album: &AlbumName, filename: &str) -> String {
    format!("{PUBLIC_PREFIX}/{album}/{filename}")
}

/// Copy every record's staged file into each of its album directories.
///
/// A file already present under the same name in an album is left alone
/// and treated as the stored copy; dedup is by filename only, so two
/// different images sharing a name keep the first one. The staged file is
/// deleted after its albums have been attempted, whether or not they all
/// succeeded.
///
/// Not transactional: the first I/O error aborts the batch, but copies
/// already committed for earlier records or albums stay on disk. Staged
/// files of the records that were never reached are discarded.
pub fn organize(root: &Path, records: &mut [UploadRecord]) -> Result<(), OrganizeError> {
    let mut failure = None;

    for record in records.iter_mut() {
        if failure.is_none() {
            if let Err(e) = file_record(root, record) {
                tracing::error!(error = %e, "file organization failed; aborting batch");
                failure = Some(e);
            }
        } else {
            tracing::warn!(filename = %record.filename, "skipping organization after earlier failure");
        }
        discard_temp(record);
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn file_record(root: &Path, record: &mut UploadRecord) -> Result<(), OrganizeError> {
    let Some(source) = record.temp_path.clone() else {
        tracing::warn!(filename = %record.filename, "record has no staged file; nothing to organize");
        return Ok(());
    };

    for album in &record.albums {
        let io_err = |source| OrganizeError::Io {
            filename: record.filename.clone(),
            album: album.to_string(),
            source,
        };

        let album_dir = root.join(album.as_str());
        std::fs::create_dir_all(&album_dir).map_err(io_err)?;

        let dest = album_dir.join(&record.filename);
        if dest.exists() {
            tracing::debug!(dest = %dest.display(), "already in album; keeping existing copy");
        } else {
            std::fs::copy(&source, &dest).map_err(io_err)?;
            tracing::info!(album = %album, filename = %record.filename, "filed");
        }

        record
            .public_paths
            .insert(album.clone(), public_path(album, &record.filename));
    }

    Ok(())
}

fn discard_temp(record: &mut UploadRecord) {
    if let Some(path) = record.temp_path.take() {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove staged upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use albums_core::Prediction;

    fn stage(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(format!("staged-{name}-{}", bytes.len()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn record(name: &str, temp: PathBuf, albums: &[&str]) -> UploadRecord {
        UploadRecord::new(
            name,
            temp,
            vec![Prediction::new("tree", 0.5)],
            albums.iter().map(|a| AlbumName::new(*a)).collect(),
        )
    }

    #[test]
    fn test_files_into_every_album() {
        let root = tempfile::tempdir().unwrap();
        let temp = stage(root.path(), "a", b"AAAA");
        let mut records = vec![record("a.jpg", temp.clone(), &["Nature", "Vehicles"])];

        organize(root.path(), &mut records).unwrap();

        for album in ["Nature", "Vehicles"] {
            let stored = root.path().join(album).join("a.jpg");
            assert_eq!(std::fs::read(stored).unwrap(), b"AAAA");
        }
        let r = &records[0];
        assert_eq!(r.public_paths[&AlbumName::new("Nature")], "/uploads/Nature/a.jpg");
        assert_eq!(r.public_paths[&AlbumName::new("Vehicles")], "/uploads/Vehicles/a.jpg");
        assert!(r.temp_path.is_none());
        assert!(!temp.exists());
    }

    #[test]
    fn test_same_name_keeps_first_copy() {
        let root = tempfile::tempdir().unwrap();
        let first = stage(root.path(), "x", b"first");
        let second = stage(root.path(), "x", b"second!");
        let mut records = vec![
            record("x.png", first.clone(), &["Nature"]),
            record("x.png", second.clone(), &["Nature"]),
        ];

        organize(root.path(), &mut records).unwrap();

        assert_eq!(std::fs::read(root.path().join("Nature/x.png")).unwrap(), b"first");
        assert_eq!(records[0].public_paths, records[1].public_paths);
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn test_existing_directory_is_reused() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("People")).unwrap();
        std::fs::write(root.path().join("People/old.jpg"), b"old").unwrap();
        let temp = stage(root.path(), "n", b"new");
        let mut records = vec![record("new.jpg", temp, &["People"])];

        organize(root.path(), &mut records).unwrap();

        assert!(root.path().join("People/old.jpg").exists());
        assert!(root.path().join("People/new.jpg").exists());
    }

    #[test]
    fn test_io_failure_aborts_without_rollback() {
        let root = tempfile::tempdir().unwrap();
        let ok = stage(root.path(), "ok", b"ok");
        // Missing staged source: the copy fails
        let missing = root.path().join("vanished.jpg");
        let later = stage(root.path(), "later", b"later");
        let mut records = vec![
            record("ok.jpg", ok.clone(), &["Nature"]),
            record("vanished.jpg", missing, &["Nature"]),
            record("later.jpg", later.clone(), &["Nature"]),
        ];

        let err = organize(root.path(), &mut records).unwrap_err();
        assert!(err.to_string().contains("vanished.jpg"));

        // First record committed and kept
        assert!(root.path().join("Nature/ok.jpg").exists());
        assert!(!records[0].public_paths.is_empty());
        // Later record never filed, staged file discarded
        assert!(!root.path().join("Nature/later.jpg").exists());
        assert!(records[2].public_paths.is_empty());
        assert!(records.iter().all(|r| r.temp_path.is_none()));
        assert!(!ok.exists());
        assert!(!later.exists());
    }

    #[test]
    fn test_album_dir_blocked_by_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("Animals"), b"not a dir").unwrap();
        let temp = stage(root.path(), "d", b"dog");
        let mut records = vec![record("dog.jpg", temp.clone(), &["Animals"])];

        let err = organize(root.path(), &mut records).unwrap_err();
        assert!(matches!(err, OrganizeError::Io { ref album, .. } if album == "Animals"));
        assert!(!temp.exists());
    }

    #[test]
    fn test_record_serializes_for_response() {
        let root = tempfile::tempdir().unwrap();
        let temp = stage(root.path(), "s", b"s");
        let mut records = vec![record("s.jpg", temp, &["Nature"])];
        organize(root.path(), &mut records).unwrap();

        let json = serde_json_value(&records[0]);
        assert_eq!(json["filename"], "s.jpg");
        assert_eq!(json["albums"][0], "Nature");
        assert_eq!(json["paths"]["Nature"], "/uploads/Nature/s.jpg");
        assert_eq!(json["predictions"][0]["label"], "tree");
        assert!(json.get("temp_path").is_none());
    }

    fn serde_json_value(record: &UploadRecord) -> serde_json::Value {
        serde_json::to_value(record).unwrap()
    }
}
