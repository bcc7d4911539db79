//! albums-store: On-disk album library.
//!
//! The storage root holds one directory per album; album membership is
//! whatever files those directories contain. There is no index or
//! sidecar metadata.

pub mod archive;
pub mod library;
pub mod organizer;
pub mod sanitize;

pub use archive::{build_zip, write_zip, ArchiveError};
pub use library::{AlbumEntry, ClearReport, Library, LibraryError};
pub use organizer::{organize, public_path, OrganizeError, UploadRecord};
pub use sanitize::{allowed_file, sanitize_filename, ALLOWED_EXTENSIONS};
