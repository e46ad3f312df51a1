//! Image backends: a directory tree or a single tar archive.
//!
//! Both backends enumerate records once, read a record's bytes on demand and
//! extract a class name from a record. Class-name *discovery* (used only when
//! a class map has to be derived) is a separate routine per backend and
//! intentionally does not go through [`ImageSource::class_name_of`]: the folder
//! backend treats every directory in the tree as a class, the archive backend
//! uses each member's parent directory name. Deeper or irregular layouts can
//! therefore discover names that extraction never produces, and vice versa.

mod archive;
mod folder;

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::path::Path;

pub use archive::{ArchiveMember, ArchiveSource};
pub use folder::FolderSource;

use super::error::DatasetError;

/// Lower-cased name suffixes that mark a file as an image.
pub const IMAGE_SUFFIXES: [&str; 3] = ["jpg", "jpeg", "png"];

/// True when the lower-cased name ends with one of [`IMAGE_SUFFIXES`].
pub fn has_image_suffix(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// A store of labelled images.
///
/// Implementations must allow concurrent `read_bytes` calls from several
/// threads; no call may rely on state left behind by another.
pub trait ImageSource: Send + Sync {
    /// Backend-specific locator for one image.
    type Record: Clone + Debug + Send + Sync;

    /// Path of the backing store.
    fn root(&self) -> &Path;

    /// Full scan of the backing store, in its natural order.
    fn enumerate(&self) -> Result<Vec<Self::Record>, DatasetError>;

    /// Raw encoded bytes of one record.
    fn read_bytes(&self, record: &Self::Record) -> Result<Vec<u8>, DatasetError>;

    /// Class name encoded in the record's location, if it has one.
    ///
    /// Non-UTF-8 names are converted lossily, the same way discovery converts them.
    fn class_name_of<'r>(&self, record: &'r Self::Record) -> Option<Cow<'r, str>>;

    /// Candidate class names for deriving a new class map.
    fn discover_class_names(&self) -> Result<BTreeSet<String>, DatasetError>;

    /// Human-readable record name for logs and errors.
    fn record_name(&self, record: &Self::Record) -> String;
}

/// Which backend serves a data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Folder,
    Archive,
}

/// Pick the backend for `path`: directories are folders, `.tar` files are archives.
pub fn detect_source_kind(path: &Path) -> Result<SourceKind, DatasetError> {
    if path.is_dir() {
        return Ok(SourceKind::Folder);
    }
    let is_tar = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tar"));
    if path.is_file() && is_tar {
        return Ok(SourceKind::Archive);
    }
    Err(DatasetError::UnsupportedSource {
        path: path.to_path_buf(),
    })
}

/// Discover class names for whichever backend serves `path`.
pub fn discover_class_names(path: &Path) -> Result<BTreeSet<String>, DatasetError> {
    match detect_source_kind(path)? {
        SourceKind::Folder => FolderSource::open(path)?.discover_class_names(),
        SourceKind::Archive => ArchiveSource::open(path)?.discover_class_names(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn image_suffix_is_case_insensitive() {
        assert!(has_image_suffix("a.JPG"));
        assert!(has_image_suffix("b.jpeg"));
        assert!(has_image_suffix("c.Png"));
        assert!(!has_image_suffix("d.gif"));
        assert!(!has_image_suffix("notes.txt"));
    }

    #[test]
    fn detects_backend_from_path() {
        let dir = tempdir().unwrap();
        let tar = dir.path().join("images.TAR");
        std::fs::write(&tar, b"").unwrap();
        let zip = dir.path().join("images.zip");
        std::fs::write(&zip, b"").unwrap();

        assert_eq!(detect_source_kind(dir.path()).unwrap(), SourceKind::Folder);
        assert_eq!(detect_source_kind(&tar).unwrap(), SourceKind::Archive);
        assert!(matches!(
            detect_source_kind(&zip),
            Err(DatasetError::UnsupportedSource { .. })
        ));
        assert!(detect_source_kind(&dir.path().join("missing")).is_err());
    }
}
