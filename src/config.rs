//! TOML description of one dataset.
//!
//! Relative paths inside a config file are resolved against the directory
//! holding that file, so a config can travel with its data.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs::{self, AppDirError};
use crate::dataset::{
    self, AnyDataset, DEFAULT_CLASS_MAP_FILE, DatasetError, DatasetOptions, LoaderConfig,
};
use crate::transform::{AugMixConfig, DEFAULT_IMAGE_SIZE};

/// File name of the dataset config inside the application directory.
pub const CONFIG_FILE_NAME: &str = "dataset.toml";

/// Errors that may occur while loading or saving a dataset config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The application directory could not be resolved.
    #[error("Failed to resolve config directory: {0}")]
    AppDir(#[from] AppDirError),
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// The config parsed but describes an unusable dataset.
    #[error("Invalid config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// One dataset: where the images are, how labels are assigned and how samples are prepared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Image directory or `.tar` archive.
    pub data_path: PathBuf,
    #[serde(default = "default_class_map_path")]
    pub class_map_path: PathBuf,
    #[serde(default)]
    pub priority_classes: Vec<String>,
    #[serde(default)]
    pub train: bool,
    #[serde(default)]
    pub tta: bool,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default)]
    pub augmix: AugMixConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

fn default_class_map_path() -> PathBuf {
    PathBuf::from(DEFAULT_CLASS_MAP_FILE)
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

impl DatasetConfig {
    /// Config with defaults for everything but the data path.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            class_map_path: default_class_map_path(),
            priority_classes: Vec::new(),
            train: false,
            tta: false,
            image_size: default_image_size(),
            augmix: AugMixConfig::default(),
            loader: LoaderConfig::default(),
        }
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            class_map_path: self.class_map_path.clone(),
            priority_classes: self.priority_classes.clone(),
            train: self.train,
            tta: self.tta,
            image_size: self.image_size,
            augmix: self.augmix,
        }
    }

    /// Build the dataset this config describes.
    pub fn open(&self) -> Result<AnyDataset, DatasetError> {
        dataset::open_dataset(&self.data_path, &self.dataset_options())
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.data_path.as_os_str().is_empty() {
            return Err(invalid("data_path must not be empty"));
        }
        if self.image_size == 0 {
            return Err(invalid("image_size must be positive"));
        }
        if self.loader.batch_size == 0 {
            return Err(invalid("loader.batch_size must be positive"));
        }
        if self.priority_classes.iter().any(|name| name.trim().is_empty()) {
            return Err(invalid("priority_classes must not contain empty names"));
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [&mut self.data_path, &mut self.class_map_path] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Default config location inside the application directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load and validate a config file, resolving relative paths against its directory.
pub fn load(path: &Path) -> Result<DatasetConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: DatasetConfig =
        toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate(path)?;
    if let Some(base) = path.parent() {
        config.resolve_relative_to(base);
    }
    Ok(config)
}

/// Save a config, creating parent directories as needed.
pub fn save(path: &Path, config: &DatasetConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
