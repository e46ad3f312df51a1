//! Epoch-based batching over a [`Dataset`].

use std::ops::Range;
use std::thread;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Dataset, DatasetError, Sample};

/// Batching knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Samples per batch; `0` is treated as `1`.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Threads fetching the items of one batch (`0` = fetch on the caller's thread).
    #[serde(default)]
    pub num_workers: usize,
    /// Shuffle the dataset at the start of every epoch.
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    /// Drop the trailing batch when it is smaller than `batch_size`.
    #[serde(default)]
    pub drop_last: bool,
    /// Seed for reproducible shuffling.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            num_workers: 0,
            shuffle: default_shuffle(),
            drop_last: false,
            seed: None,
        }
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_shuffle() -> bool {
    true
}

/// Yields batches of samples, reshuffling the dataset between epochs.
///
/// The loader holds the dataset mutably, so shuffling can never overlap
/// with item access.
pub struct DataLoader<'a, D: Dataset> {
    dataset: &'a mut D,
    config: LoaderConfig,
    rng: StdRng,
    epochs: usize,
}

impl<'a, D: Dataset> DataLoader<'a, D> {
    pub fn new(dataset: &'a mut D, config: LoaderConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            dataset,
            config,
            rng,
            epochs: 0,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Number of batches one epoch yields.
    pub fn num_batches(&self) -> usize {
        let len = self.dataset.len();
        if self.config.drop_last {
            len / self.batch_size()
        } else {
            len.div_ceil(self.batch_size())
        }
    }

    /// Start a new epoch, shuffling first when configured.
    pub fn epoch(&mut self) -> Epoch<'_, D> {
        if self.config.shuffle {
            self.dataset.shuffle_with_rng(&mut self.rng);
        }
        self.epochs += 1;
        debug!(
            "Epoch {} started: {} batches of up to {}",
            self.epochs,
            self.num_batches(),
            self.batch_size()
        );
        Epoch {
            dataset: &*self.dataset,
            batch_size: self.batch_size(),
            num_workers: self.config.num_workers,
            next: 0,
            num_batches: self.num_batches(),
        }
    }

    /// Epochs started so far.
    pub fn epochs(&self) -> usize {
        self.epochs
    }
}

/// Batches of one epoch. A failed item fails its whole batch.
pub struct Epoch<'l, D: Dataset> {
    dataset: &'l D,
    batch_size: usize,
    num_workers: usize,
    next: usize,
    num_batches: usize,
}

impl<D: Dataset> Iterator for Epoch<'_, D> {
    type Item = Result<Vec<Sample>, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.num_batches {
            return None;
        }
        let start = self.next * self.batch_size;
        let end = (start + self.batch_size).min(self.dataset.len());
        self.next += 1;
        Some(fetch(self.dataset, start..end, self.num_workers))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.num_batches - self.next;
        (remaining, Some(remaining))
    }
}

impl<D: Dataset> ExactSizeIterator for Epoch<'_, D> {}

fn fetch<D: Dataset>(
    dataset: &D,
    indices: Range<usize>,
    num_workers: usize,
) -> Result<Vec<Sample>, DatasetError> {
    if num_workers == 0 || indices.len() <= 1 {
        return indices.map(|index| dataset.get_item(index)).collect();
    }
    let indices: Vec<usize> = indices.collect();
    let chunk_len = indices.len().div_ceil(num_workers);
    thread::scope(|scope| {
        let handles: Vec<_> = indices
            .chunks(chunk_len)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|&index| dataset.get_item(index))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        let mut samples = Vec::with_capacity(indices.len());
        for handle in handles {
            let part = handle.join().map_err(|_| DatasetError::WorkerPanicked)??;
            samples.extend(part);
        }
        Ok(samples)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ClassMap;
    use crate::transform::{ImageInput, ImageTensor};
    use rand::Rng;
    use rand::seq::SliceRandom;

    struct Labels {
        labels: Vec<usize>,
        broken: Option<usize>,
        class_map: ClassMap,
    }

    impl Labels {
        fn new(len: usize) -> Self {
            Self {
                labels: (0..len).collect(),
                broken: None,
                class_map: ClassMap::default(),
            }
        }
    }

    impl Dataset for Labels {
        fn len(&self) -> usize {
            self.labels.len()
        }

        fn get_item(&self, index: usize) -> Result<Sample, DatasetError> {
            if self.broken == Some(self.labels[index]) {
                return Err(DatasetError::IndexOutOfRange { index, len: 0 });
            }
            Ok(Sample {
                image: ImageInput::Tensor(ImageTensor::zeros(1, 1, 1)),
                label: self.labels[index],
            })
        }

        fn shuffle_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) {
            self.labels.shuffle(rng);
        }

        fn class_map(&self) -> &ClassMap {
            &self.class_map
        }
    }

    fn labels_of(batches: Vec<Vec<Sample>>) -> Vec<usize> {
        batches.into_iter().flatten().map(|s| s.label).collect()
    }

    #[test]
    fn batch_count_respects_drop_last() {
        let mut dataset = Labels::new(10);
        let config = LoaderConfig {
            batch_size: 4,
            shuffle: false,
            ..LoaderConfig::default()
        };
        let mut loader = DataLoader::new(&mut dataset, config.clone());
        assert_eq!(loader.num_batches(), 3);
        let sizes: Vec<usize> = loader.epoch().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let mut dataset = Labels::new(10);
        let loader = DataLoader::new(
            &mut dataset,
            LoaderConfig {
                drop_last: true,
                ..config
            },
        );
        assert_eq!(loader.num_batches(), 2);
    }

    #[test]
    fn shuffled_epoch_visits_every_item_once() {
        let mut dataset = Labels::new(25);
        let mut loader = DataLoader::new(
            &mut dataset,
            LoaderConfig {
                batch_size: 7,
                seed: Some(5),
                ..LoaderConfig::default()
            },
        );
        let batches: Vec<Vec<Sample>> = loader.epoch().collect::<Result<_, _>>().unwrap();
        let mut labels = labels_of(batches);
        assert_ne!(labels, (0..25).collect::<Vec<_>>());
        labels.sort_unstable();
        assert_eq!(labels, (0..25).collect::<Vec<_>>());
        assert_eq!(loader.epochs(), 1);
    }

    #[test]
    fn seeded_loaders_agree_and_epochs_differ() {
        let config = LoaderConfig {
            batch_size: 5,
            seed: Some(42),
            ..LoaderConfig::default()
        };
        let mut a = Labels::new(20);
        let mut b = Labels::new(20);
        let mut first = DataLoader::new(&mut a, config.clone());
        let mut second = DataLoader::new(&mut b, config);

        let epoch_one = labels_of(first.epoch().collect::<Result<_, _>>().unwrap());
        let other = labels_of(second.epoch().collect::<Result<_, _>>().unwrap());
        assert_eq!(epoch_one, other);

        let epoch_two = labels_of(first.epoch().collect::<Result<_, _>>().unwrap());
        assert_ne!(epoch_one, epoch_two);
    }

    #[test]
    fn workers_preserve_batch_order() {
        let config = LoaderConfig {
            batch_size: 9,
            shuffle: false,
            num_workers: 4,
            ..LoaderConfig::default()
        };
        let mut dataset = Labels::new(20);
        let mut loader = DataLoader::new(&mut dataset, config);
        let labels = labels_of(loader.epoch().collect::<Result<_, _>>().unwrap());
        assert_eq!(labels, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn failing_item_fails_its_batch_only() {
        let mut dataset = Labels::new(6);
        dataset.broken = Some(4);
        let mut loader = DataLoader::new(
            &mut dataset,
            LoaderConfig {
                batch_size: 3,
                shuffle: false,
                num_workers: 2,
                ..LoaderConfig::default()
            },
        );
        let results: Vec<_> = loader.epoch().collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
