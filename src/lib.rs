//! Dataset layer for plankton and other ecological image classifiers.
/// Application directory helpers.
pub mod app_dirs;
/// TOML dataset configuration.
pub mod config;
/// Class maps, image backends, datasets and batching.
pub mod dataset;
/// Tracing subscriber setup.
pub mod logging;
/// Image transform chains (train, eval, TTA).
pub mod transform;
