//! Class name to label mapping: loading, one-time derivation and persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::DatasetError;
use super::priority::{self, REST_LABEL};

/// Mapping from class name to integer label.
///
/// Labels are not required to be contiguous or unique: a priority map sends
/// several names to the same label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassMap {
    labels: BTreeMap<String, usize>,
}

impl ClassMap {
    /// Assign `0..N-1` to the distinct names in lexicographic order.
    pub fn from_class_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>()
            .into_iter()
            .enumerate()
            .map(|(label, name)| (name, label))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, label: usize) {
        self.labels.insert(name.into(), label);
    }

    pub fn label_of(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Label used at sample access: unknown or missing names fall back to the rest label.
    pub fn label_or_rest(&self, name: Option<&str>) -> usize {
        match name.and_then(|name| self.label_of(name)) {
            Some(label) => label,
            None => REST_LABEL,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// Number of entries, which the training side uses as the class count.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(name, label)| (name.as_str(), *label))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    /// Parse a class map file.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let bytes = fs::read(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| DatasetError::MalformedClassMap {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the map as 4-space indented JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| DatasetError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut bytes = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
        self.serialize(&mut serializer)
            .map_err(DatasetError::SerializeClassMap)?;
        fs::write(path, bytes).map_err(|source| DatasetError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl FromIterator<(String, usize)> for ClassMap {
    fn from_iter<T: IntoIterator<Item = (String, usize)>>(iter: T) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}

/// Class map path actually used, given the configured priority classes.
pub fn effective_class_map_path(path: &Path, priority_classes: &[String]) -> PathBuf {
    if priority_classes.is_empty() {
        path.to_path_buf()
    } else {
        priority::priority_class_map_path(path)
    }
}

/// Derive a class map from discovered class names.
///
/// Without priority classes the names are labelled `0..N-1` alphabetically.
/// With priority classes every one of them must have been discovered; the
/// result is then the collapsed priority map.
pub fn derive_class_map(
    discovered: &BTreeSet<String>,
    priority_classes: &[String],
) -> Result<ClassMap, DatasetError> {
    let derived = ClassMap::from_class_names(discovered.iter().cloned());
    info!("Found {} classes.", derived.len());
    if priority_classes.is_empty() {
        return Ok(derived);
    }
    info!("Priority classes set; collapsing remaining classes into rest");
    if let Some(missing) = priority_classes.iter().find(|name| !derived.contains(name)) {
        return Err(DatasetError::PriorityClassNotFound {
            class: missing.clone(),
            discovered: discovered.iter().cloned().collect(),
        });
    }
    Ok(priority::define_priority_classes(priority_classes))
}

/// Load the class map for a dataset, deriving and persisting it on the first training run.
///
/// `discover` is only invoked when the map has to be derived. Evaluation runs
/// (`train == false`) never derive.
pub fn resolve<F>(
    class_map_path: &Path,
    priority_classes: &[String],
    train: bool,
    discover: F,
) -> Result<ClassMap, DatasetError>
where
    F: FnOnce() -> Result<BTreeSet<String>, DatasetError>,
{
    let path = effective_class_map_path(class_map_path, priority_classes);
    if !priority_classes.is_empty() {
        info!(
            "Priority classes {:?}; class map path set to {}",
            priority_classes,
            path.display()
        );
    }

    if path.exists() {
        info!("Loading class map from {}", path.display());
        let map = ClassMap::load(&path)?;
        info!("Class map loaded ({} entries)", map.len());
        return Ok(map);
    }
    if !train {
        return Err(DatasetError::MissingClassMap { path });
    }

    info!(
        "Class map not found at {}; deriving it from the dataset",
        path.display()
    );
    let discovered = discover()?;
    let map = derive_class_map(&discovered, priority_classes)?;
    info!("Saving class map to {}", path.display());
    map.save(&path)?;
    Ok(map)
}
