use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tar::{Archive, EntryType};
use tracing::debug;

use super::{ImageSource, has_image_suffix};
use crate::dataset::error::DatasetError;

/// Location of one image inside an uncompressed tar archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Member name as stored in the archive, `/`-separated.
    pub name: String,
    /// Byte offset of the member's data within the archive file.
    pub offset: u64,
    /// Length of the member's data in bytes.
    pub size: u64,
}

/// Images stored in a single tar archive as `<top>/<class>/<image>`.
///
/// Member headers are scanned on `enumerate`. Every read opens its
/// own file handle and seeks straight to the member, so concurrent reads
/// share no cursor.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
}

impl ArchiveSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let path = path.into();
        if !path.is_file() {
            return Err(DatasetError::UnsupportedSource { path });
        }
        Ok(Self { path })
    }

    fn archive(&self) -> Result<Archive<BufReader<File>>, DatasetError> {
        let file = File::open(&self.path).map_err(|source| self.archive_error(source))?;
        Ok(Archive::new(BufReader::new(file)))
    }

    fn archive_error(&self, source: std::io::Error) -> DatasetError {
        DatasetError::Archive {
            path: self.path.clone(),
            source,
        }
    }

    /// Visit `(name, entry_type, offset, size)` for every member header.
    fn scan(
        &self,
        mut visit: impl FnMut(String, EntryType, u64, u64),
    ) -> Result<(), DatasetError> {
        let mut archive = self.archive()?;
        let entries = archive
            .entries()
            .map_err(|source| self.archive_error(source))?;
        for entry in entries {
            let entry = entry.map_err(|source| self.archive_error(source))?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_pax_global_extensions() {
                continue;
            }
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            visit(name, entry_type, entry.raw_file_position(), entry.size());
        }
        Ok(())
    }
}

impl ImageSource for ArchiveSource {
    type Record = ArchiveMember;

    fn root(&self) -> &Path {
        &self.path
    }

    /// Regular-file members whose names carry an image suffix, in archive order.
    ///
    /// GNU sparse members are skipped: their stored data is not the file's
    /// contiguous byte range, so it cannot be read by offset.
    fn enumerate(&self) -> Result<Vec<ArchiveMember>, DatasetError> {
        let mut members = Vec::new();
        self.scan(|name, entry_type, offset, size| {
            if !has_image_suffix(&name) {
                return;
            }
            if is_contiguous_file(&entry_type) {
                members.push(ArchiveMember { name, offset, size });
            } else if entry_type.is_gnu_sparse() {
                debug!("Skipping sparse archive member {name}");
            }
        })?;
        debug!(
            "Found {} images in archive {}",
            members.len(),
            self.path.display()
        );
        Ok(members)
    }

    fn read_bytes(&self, record: &ArchiveMember) -> Result<Vec<u8>, DatasetError> {
        let member_error = |source: std::io::Error| DatasetError::ArchiveMember {
            path: self.path.clone(),
            member: record.name.clone(),
            source,
        };
        let mut file = File::open(&self.path).map_err(member_error)?;
        file.seek(SeekFrom::Start(record.offset))
            .map_err(member_error)?;
        let len = usize::try_from(record.size).map_err(|_| {
            member_error(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "member too large for this platform",
            ))
        })?;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes).map_err(member_error)?;
        Ok(bytes)
    }

    /// Second `/`-separated segment of the member name.
    fn class_name_of<'r>(&self, record: &'r ArchiveMember) -> Option<Cow<'r, str>> {
        record.name.split('/').nth(1).map(Cow::Borrowed)
    }

    /// Parent directory name of every non-directory member, images or not.
    /// Members at the archive root contribute the empty name.
    fn discover_class_names(&self) -> Result<BTreeSet<String>, DatasetError> {
        let mut names = BTreeSet::new();
        self.scan(|name, entry_type, _, _| {
            if !entry_type.is_dir() {
                names.insert(parent_dir_name(&name).to_string());
            }
        })?;
        Ok(names)
    }

    fn record_name(&self, record: &ArchiveMember) -> String {
        format!("{}:{}", self.path.display(), record.name)
    }
}

/// File members whose data is stored as one contiguous run after the header.
fn is_contiguous_file(entry_type: &EntryType) -> bool {
    matches!(entry_type, EntryType::Regular | EntryType::Continuous)
}

/// Basename of the dirname of a `/`-separated member name.
fn parent_dir_name(name: &str) -> &str {
    let dir = match name.rsplit_once('/') {
        Some((dir, _)) => dir.trim_end_matches('/'),
        None => "",
    };
    dir.rsplit('/').next().unwrap_or_default()
}
