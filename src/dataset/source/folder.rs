use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ImageSource, has_image_suffix};
use crate::dataset::error::DatasetError;

/// Images laid out as `<root>/<class>/<image>` on the filesystem.
///
/// Records are full paths (`root` joined with the relative location). The
/// walk is top-down: a directory's files come before the contents of its
/// subdirectories. Symlinked directories are listed but not descended into.
#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
}

impl FolderSource {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DatasetError::UnsupportedSource { path: root });
        }
        Ok(Self { root })
    }
}

impl ImageSource for FolderSource {
    type Record = PathBuf;

    fn root(&self) -> &Path {
        &self.root
    }

    fn enumerate(&self) -> Result<Vec<PathBuf>, DatasetError> {
        let mut images = Vec::new();
        walk(&self.root, &mut |_, files| {
            images.extend(
                files
                    .iter()
                    .filter(|path| {
                        path.file_name()
                            .is_some_and(|name| has_image_suffix(&name.to_string_lossy()))
                    })
                    .cloned(),
            );
        })?;
        debug!("Found {} images under {}", images.len(), self.root.display());
        Ok(images)
    }

    fn read_bytes(&self, record: &PathBuf) -> Result<Vec<u8>, DatasetError> {
        fs::read(record).map_err(|source| DatasetError::Read {
            path: record.clone(),
            source,
        })
    }

    /// Name of the parent directory.
    fn class_name_of<'r>(&self, record: &'r PathBuf) -> Option<Cow<'r, str>> {
        record.parent()?.file_name().map(|name| name.to_string_lossy())
    }

    /// Every directory name anywhere below the root, including empty and
    /// intermediate directories.
    fn discover_class_names(&self) -> Result<BTreeSet<String>, DatasetError> {
        let mut names = BTreeSet::new();
        walk(&self.root, &mut |dirs, _| {
            names.extend(
                dirs.iter()
                    .filter_map(|dir| dir.file_name())
                    .map(|name| name.to_string_lossy().into_owned()),
            );
        })?;
        Ok(names)
    }

    fn record_name(&self, record: &PathBuf) -> String {
        record.display().to_string()
    }
}

/// Top-down directory walk calling `visit(subdirs, files)` once per directory.
fn walk(dir: &Path, visit: &mut dyn FnMut(&[PathBuf], &[PathBuf])) -> Result<(), DatasetError> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::WalkDir {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::WalkDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            files.push(path);
        }
    }
    visit(&dirs, &files);
    for sub in &dirs {
        let is_link = fs::symlink_metadata(sub).is_ok_and(|meta| meta.file_type().is_symlink());
        if !is_link {
            walk(sub, visit)?;
        }
    }
    Ok(())
}
