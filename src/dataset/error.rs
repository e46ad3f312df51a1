use std::path::PathBuf;

use thiserror::Error;

use crate::transform::TransformError;

/// Errors raised while building or reading an image dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Evaluation runs need a class map from a previous training run.
    #[error("Class map not found at {path}. Class map needs to be present for evaluation.")]
    MissingClassMap {
        /// Effective class map path (after the priority rewrite).
        path: PathBuf,
    },
    /// The class map file exists but is not a JSON object of non-negative integers.
    #[error("Invalid class map at {path}: {source}")]
    MalformedClassMap {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A configured priority class was not found while deriving the class map.
    #[error(
        "Priority class {class} not found in class map. Discovered classes: [{}]",
        .discovered.join(", ")
    )]
    PriorityClassNotFound {
        /// The missing priority class.
        class: String,
        /// Every class name discovered in the backing store, sorted.
        discovered: Vec<String>,
    },
    /// Failed to serialize a class map.
    #[error("Failed to serialize class map: {0}")]
    SerializeClassMap(serde_json::Error),
    /// The data path is neither a directory nor a tar archive.
    #[error("Unsupported dataset path {path}: expected a directory or a .tar archive")]
    UnsupportedSource { path: PathBuf },
    /// Failed to create a directory.
    #[error("Unable to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to list a directory while walking a folder dataset.
    #[error("Failed to walk {path}: {source}")]
    WalkDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read a file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write a file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The tar archive could not be parsed.
    #[error("Invalid archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Reading one archive member failed.
    #[error("Failed to read member {member} of {path}: {source}")]
    ArchiveMember {
        path: PathBuf,
        member: String,
        source: std::io::Error,
    },
    /// Image bytes could not be decoded.
    #[error("Failed to decode {record}: {source}")]
    Decode {
        record: String,
        source: image::ImageError,
    },
    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("A loader worker panicked")]
    WorkerPanicked,
    #[error(transparent)]
    Transform(#[from] TransformError),
}
