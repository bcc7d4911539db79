//! Zip archives of whole albums.

use std::fs::File;
use std::io::{self, Cursor, Seek, Write};
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("walking album directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Build an in-memory zip of `root/<album>`.
///
/// Returns `Ok(None)` if the album directory does not exist.
pub fn build_zip(root: &Path, album: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let album_dir = root.join(album);
    if !album_dir.is_dir() {
        tracing::debug!(album, "album not found");
        return Ok(None);
    }

    let mut buffer = Cursor::new(Vec::new());
    let members = write_zip(&album_dir, album, &mut buffer)?;
    tracing::info!(album, members, bytes = buffer.get_ref().len(), "album archived");
    Ok(Some(buffer.into_inner()))
}

/// Write every file under `album_dir` (recursively) into a deflate zip.
///
/// Member names are `<album>/<relative path>` with `/` separators, in
/// filesystem traversal order. Returns the number of members written.
pub fn write_zip<W: Write + Seek>(album_dir: &Path, album: &str, writer: W) -> Result<usize, ArchiveError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut members = 0;

    for entry in WalkDir::new(album_dir).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(album_dir)
            .map_err(io::Error::other)?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let name = format!("{album}/{}", relative.join("/"));

        zip.start_file(name, options)?;
        let mut file = File::open(entry.path())?;
        io::copy(&mut file, &mut zip)?;
        members += 1;
    }

    zip.finish()?;
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Read;

    fn member_names(bytes: Vec<u8>) -> BTreeSet<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_missing_album_is_none() {
        let root = tempfile::tempdir().unwrap();
        assert!(build_zip(root.path(), "Nope").unwrap().is_none());
    }

    #[test]
    fn test_file_named_like_album_is_none() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("Nature"), b"x").unwrap();
        assert!(build_zip(root.path(), "Nature").unwrap().is_none());
    }

    #[test]
    fn test_members_rooted_at_album_name() {
        let root = tempfile::tempdir().unwrap();
        let album = root.path().join("Nature");
        std::fs::create_dir_all(album.join("nested")).unwrap();
        std::fs::write(album.join("a.jpg"), b"aaa").unwrap();
        std::fs::write(album.join("nested/b.png"), b"bbb").unwrap();

        let bytes = build_zip(root.path(), "Nature").unwrap().unwrap();
        let names = member_names(bytes);
        let expected: BTreeSet<String> = ["Nature/a.jpg", "Nature/nested/b.png"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_member_contents_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let album = root.path().join("People");
        std::fs::create_dir(&album).unwrap();
        let payload = vec![7u8; 10_000];
        std::fs::write(album.join("face.jpg"), &payload).unwrap();

        let bytes = build_zip(root.path(), "People").unwrap().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut member = archive.by_name("People/face.jpg").unwrap();
        assert_eq!(member.compression(), CompressionMethod::Deflated);
        let mut out = Vec::new();
        member.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_empty_album_is_valid_zip() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("Other")).unwrap();
        let bytes = build_zip(root.path(), "Other").unwrap().unwrap();
        assert!(member_names(bytes).is_empty());
    }
}
