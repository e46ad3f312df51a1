//! Labelled image datasets over a folder tree or a tar archive.
//!
//! A [`SampleDataset`] is built eagerly: the transform chains are validated,
//! the class map is loaded (or derived on the first training run), and the
//! backend is scanned once for image records. Each access then decodes one
//! record and pairs it with the label of its class.

pub mod class_map;
pub mod error;
pub mod loader;
pub mod priority;
pub mod source;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

pub use class_map::ClassMap;
pub use error::DatasetError;
pub use loader::{DataLoader, LoaderConfig};
pub use source::{ArchiveMember, ArchiveSource, FolderSource, ImageSource, SourceKind};

use crate::transform::{AugMixConfig, DEFAULT_IMAGE_SIZE, ImageInput, TransformPipeline};

/// Default class map file name.
pub const DEFAULT_CLASS_MAP_FILE: &str = "class_map.json";

/// Dataset construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOptions {
    /// Base class map path. With priority classes the `_priority` sibling is used instead.
    pub class_map_path: PathBuf,
    /// Classes kept individually; everything else collapses into label 0.
    pub priority_classes: Vec<String>,
    /// Training mode: random transforms, and class map derivation when the file is missing.
    pub train: bool,
    /// Test-time augmentation: each sample yields one tensor per fixed rotation.
    pub tta: bool,
    pub image_size: u32,
    pub augmix: AugMixConfig,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            class_map_path: PathBuf::from(DEFAULT_CLASS_MAP_FILE),
            priority_classes: Vec::new(),
            train: false,
            tta: false,
            image_size: DEFAULT_IMAGE_SIZE,
            augmix: AugMixConfig::default(),
        }
    }
}

/// One decoded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: ImageInput,
    pub label: usize,
}

/// Random-access view over the labelled images of one backend.
#[derive(Debug)]
pub struct SampleDataset<S: ImageSource> {
    source: S,
    class_map: ClassMap,
    class_map_path: PathBuf,
    records: Vec<S::Record>,
    transforms: TransformPipeline,
    train: bool,
    tta: bool,
}

/// Dataset over a `<root>/<class>/<image>` directory tree.
pub type ImageFolderDataset = SampleDataset<FolderSource>;
/// Dataset over a tar archive laid out as `<top>/<class>/<image>`.
pub type TarImageDataset = SampleDataset<ArchiveSource>;

impl<S: ImageSource> SampleDataset<S> {
    /// Build a dataset. Fails without side effects when the class map cannot be resolved.
    pub fn new(source: S, options: &DatasetOptions) -> Result<Self, DatasetError> {
        let transforms =
            TransformPipeline::new(options.image_size, options.augmix, options.tta)?;
        let class_map_path =
            class_map::effective_class_map_path(&options.class_map_path, &options.priority_classes);
        let class_map = class_map::resolve(
            &options.class_map_path,
            &options.priority_classes,
            options.train,
            || source.discover_class_names(),
        )?;
        let records = source.enumerate()?;
        if records.is_empty() {
            warn!("No images found in {}", source.root().display());
        }
        info!(
            "Dataset at {} ready: {} images, {} classes (train: {}, tta: {})",
            source.root().display(),
            records.len(),
            class_map.len(),
            options.train,
            options.tta
        );
        Ok(Self {
            source,
            class_map,
            class_map_path,
            records,
            transforms,
            train: options.train,
            tta: options.tta,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn class_map(&self) -> &ClassMap {
        &self.class_map
    }

    /// Path the class map was loaded from or written to.
    pub fn class_map_path(&self) -> &Path {
        &self.class_map_path
    }

    pub fn records(&self) -> &[S::Record] {
        &self.records
    }

    /// Decode and transform the sample at `index`, drawing train-time randomness from the thread RNG.
    pub fn get_item(&self, index: usize) -> Result<Sample, DatasetError> {
        self.get_item_with_rng(index, &mut rand::rng())
    }

    /// Same as [`Self::get_item`] with an explicit RNG for the train chain.
    pub fn get_item_with_rng<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<Sample, DatasetError> {
        let record = self.record(index)?;
        let bytes = self.source.read_bytes(record)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|source| DatasetError::Decode {
                record: self.source.record_name(record),
                source,
            })?
            .to_rgb8();
        let image = if self.tta {
            ImageInput::Rotations(self.transforms.tta(&image))
        } else if self.train {
            ImageInput::Tensor(self.transforms.train(&image, rng))
        } else {
            ImageInput::Tensor(self.transforms.eval(&image))
        };
        Ok(Sample {
            image,
            label: self.label_of(record),
        })
    }

    /// Label of the record at `index` without decoding it.
    pub fn label_at(&self, index: usize) -> Result<usize, DatasetError> {
        let record = self.record(index)?;
        Ok(self.label_of(record))
    }

    /// Class name extracted from the record at `index`, if its location has one.
    pub fn record_class_name(&self, index: usize) -> Result<Option<Cow<'_, str>>, DatasetError> {
        let record = self.record(index)?;
        Ok(self.source.class_name_of(record))
    }

    /// Number of records per label.
    pub fn label_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(self.label_of(record)).or_insert(0) += 1;
        }
        counts
    }

    /// Uniformly permute the records using the thread RNG.
    pub fn shuffle(&mut self) {
        self.shuffle_with_rng(&mut rand::rng());
    }

    pub fn shuffle_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.records.shuffle(rng);
    }

    fn record(&self, index: usize) -> Result<&S::Record, DatasetError> {
        self.records.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.records.len(),
        })
    }

    fn label_of(&self, record: &S::Record) -> usize {
        let name = self.source.class_name_of(record);
        let name = name.as_deref();
        if !name.is_some_and(|name| self.class_map.contains(name)) {
            debug!(
                "No class map entry for {}; using label {}",
                self.source.record_name(record),
                priority::REST_LABEL
            );
        }
        self.class_map.label_or_rest(name)
    }
}

/// What the data loader and tools need from a dataset.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_item(&self, index: usize) -> Result<Sample, DatasetError>;

    fn shuffle_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R);

    fn class_map(&self) -> &ClassMap;
}

impl<S: ImageSource> Dataset for SampleDataset<S> {
    fn len(&self) -> usize {
        SampleDataset::len(self)
    }

    fn get_item(&self, index: usize) -> Result<Sample, DatasetError> {
        SampleDataset::get_item(self, index)
    }

    fn shuffle_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        SampleDataset::shuffle_with_rng(self, rng);
    }

    fn class_map(&self) -> &ClassMap {
        SampleDataset::class_map(self)
    }
}

/// A dataset whose backend was picked from the data path.
#[derive(Debug)]
pub enum AnyDataset {
    Folder(ImageFolderDataset),
    Archive(TarImageDataset),
}

impl AnyDataset {
    pub fn kind(&self) -> SourceKind {
        match self {
            AnyDataset::Folder(_) => SourceKind::Folder,
            AnyDataset::Archive(_) => SourceKind::Archive,
        }
    }

    pub fn label_at(&self, index: usize) -> Result<usize, DatasetError> {
        match self {
            AnyDataset::Folder(dataset) => dataset.label_at(index),
            AnyDataset::Archive(dataset) => dataset.label_at(index),
        }
    }

    pub fn label_counts(&self) -> BTreeMap<usize, usize> {
        match self {
            AnyDataset::Folder(dataset) => dataset.label_counts(),
            AnyDataset::Archive(dataset) => dataset.label_counts(),
        }
    }

    pub fn class_map_path(&self) -> &Path {
        match self {
            AnyDataset::Folder(dataset) => dataset.class_map_path(),
            AnyDataset::Archive(dataset) => dataset.class_map_path(),
        }
    }
}

impl Dataset for AnyDataset {
    fn len(&self) -> usize {
        match self {
            AnyDataset::Folder(dataset) => dataset.len(),
            AnyDataset::Archive(dataset) => dataset.len(),
        }
    }

    fn get_item(&self, index: usize) -> Result<Sample, DatasetError> {
        match self {
            AnyDataset::Folder(dataset) => dataset.get_item(index),
            AnyDataset::Archive(dataset) => dataset.get_item(index),
        }
    }

    fn shuffle_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        match self {
            AnyDataset::Folder(dataset) => dataset.shuffle_with_rng(rng),
            AnyDataset::Archive(dataset) => dataset.shuffle_with_rng(rng),
        }
    }

    fn class_map(&self) -> &ClassMap {
        match self {
            AnyDataset::Folder(dataset) => dataset.class_map(),
            AnyDataset::Archive(dataset) => dataset.class_map(),
        }
    }
}

/// Open `data_path` with the backend it calls for: directories as folders, `.tar` files as archives.
pub fn open_dataset(data_path: &Path, options: &DatasetOptions) -> Result<AnyDataset, DatasetError> {
    match source::detect_source_kind(data_path)? {
        SourceKind::Folder => {
            SampleDataset::new(FolderSource::open(data_path)?, options).map(AnyDataset::Folder)
        }
        SourceKind::Archive => {
            SampleDataset::new(ArchiveSource::open(data_path)?, options).map(AnyDataset::Archive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let image = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 40) as u8, (y * 40) as u8, 128])
        });
        image.save(path).unwrap();
    }

    fn options(dir: &Path, train: bool) -> DatasetOptions {
        DatasetOptions {
            class_map_path: dir.join("out").join(DEFAULT_CLASS_MAP_FILE),
            train,
            image_size: 8,
            ..DatasetOptions::default()
        }
    }

    #[test]
    fn training_dataset_derives_class_map_and_labels_items() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        write_png(&root.join("cat/a.png"), 4, 4);
        write_png(&root.join("dog/b.png"), 6, 3);

        let dataset = SampleDataset::new(FolderSource::open(&root).unwrap(), &options(dir.path(), true))
            .unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.class_map().label_of("cat"), Some(0));
        assert_eq!(dataset.class_map().label_of("dog"), Some(1));
        assert!(dataset.class_map_path().is_file());

        let mut rng = StdRng::seed_from_u64(3);
        for index in 0..dataset.len() {
            let sample = dataset.get_item_with_rng(index, &mut rng).unwrap();
            let tensor = sample.image.as_tensor().unwrap();
            assert_eq!(tensor.shape(), [3, 8, 8]);
            let expected = match dataset.record_class_name(index).unwrap().as_deref() {
                Some("cat") => 0,
                Some("dog") => 1,
                other => panic!("unexpected class {other:?}"),
            };
            assert_eq!(sample.label, expected);
        }
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        write_png(&root.join("cat/a.png"), 4, 4);
        let dataset = SampleDataset::new(FolderSource::open(&root).unwrap(), &options(dir.path(), true))
            .unwrap();
        assert!(matches!(
            dataset.get_item(1),
            Err(DatasetError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn undecodable_image_reports_the_record() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        fs::create_dir_all(root.join("cat")).unwrap();
        fs::write(root.join("cat/broken.png"), b"not a png").unwrap();
        let dataset = SampleDataset::new(FolderSource::open(&root).unwrap(), &options(dir.path(), true))
            .unwrap();
        match dataset.get_item(0) {
            Err(DatasetError::Decode { record, .. }) => assert!(record.ends_with("broken.png")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_transforms_fail_before_class_map_is_written() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        write_png(&root.join("cat/a.png"), 4, 4);
        let options = DatasetOptions {
            image_size: 0,
            ..options(dir.path(), true)
        };
        assert!(SampleDataset::new(FolderSource::open(&root).unwrap(), &options).is_err());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn seeded_shuffle_is_reproducible_and_keeps_records() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        for idx in 0..8 {
            write_png(&root.join(format!("cat/{idx}.png")), 2, 2);
        }
        let source = FolderSource::open(&root).unwrap();
        let mut first = SampleDataset::new(source.clone(), &options(dir.path(), true)).unwrap();
        let mut second = SampleDataset::new(source, &options(dir.path(), false)).unwrap();

        let mut before = first.records().to_vec();
        first.shuffle_with_rng(&mut StdRng::seed_from_u64(11));
        second.shuffle_with_rng(&mut StdRng::seed_from_u64(11));
        assert_eq!(first.records(), second.records());

        let mut after = first.records().to_vec();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn shuffle_changes_record_order() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        for idx in 0..12 {
            write_png(&root.join(format!("cat/{idx}.png")), 2, 2);
        }
        let mut dataset =
            SampleDataset::new(FolderSource::open(&root).unwrap(), &options(dir.path(), true))
                .unwrap();
        let original = dataset.records().to_vec();

        dataset.shuffle_with_rng(&mut StdRng::seed_from_u64(5));
        assert_ne!(dataset.records(), original.as_slice());

        let seeded = dataset.records().to_vec();
        let reordered = (0..5).any(|_| {
            dataset.shuffle();
            dataset.records() != seeded.as_slice()
        });
        assert!(reordered);
    }

    #[test]
    fn open_dataset_rejects_unknown_paths() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("images.zip");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            open_dataset(&file, &DatasetOptions::default()),
            Err(DatasetError::UnsupportedSource { .. })
        ));
    }
}
