//! Transform chains applied to decoded RGB images.
//!
//! Three chains share one resize target and one set of normalization
//! statistics:
//!
//! - train: random horizontal flip, resize, scale to `[0, 1]`, AugMix, normalize
//! - eval: resize, scale, normalize
//! - TTA: four fixed rotations, each followed by the eval chain
//!
//! The chain is picked per sample by the dataset, not here.

mod augmix;
pub mod ops;
mod tensor;

use std::collections::BTreeMap;

use image::RgbImage;
use rand::Rng;
use thiserror::Error;

pub use augmix::{AugMix, AugMixConfig};
pub use ops::TtaRotation;
pub use tensor::ImageTensor;

/// ImageNet channel means.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Default square edge length fed to the model.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;
/// Probability of the train-time horizontal flip.
pub const FLIP_PROBABILITY: f64 = 0.5;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid AugMix configuration: {0}")]
    InvalidAugMix(String),
    #[error("image size must be positive")]
    ZeroImageSize,
}

/// The image half of a sample: a single tensor, or one tensor per TTA rotation.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageInput {
    Tensor(ImageTensor),
    /// Keyed by rotation label (`"0"`, `"90"`, `"180"`, `"270"`).
    Rotations(BTreeMap<String, ImageTensor>),
}

impl ImageInput {
    pub fn as_tensor(&self) -> Option<&ImageTensor> {
        match self {
            ImageInput::Tensor(tensor) => Some(tensor),
            ImageInput::Rotations(_) => None,
        }
    }

    pub fn rotations(&self) -> Option<&BTreeMap<String, ImageTensor>> {
        match self {
            ImageInput::Tensor(_) => None,
            ImageInput::Rotations(map) => Some(map),
        }
    }

    /// Every tensor carried by this input.
    pub fn tensors(&self) -> Vec<&ImageTensor> {
        match self {
            ImageInput::Tensor(tensor) => vec![tensor],
            ImageInput::Rotations(map) => map.values().collect(),
        }
    }
}

/// Train, eval and (optionally) TTA chains for one dataset.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    image_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    augmix: AugMix,
    rotations: Vec<TtaRotation>,
}

impl TransformPipeline {
    /// Build the chains. The TTA rotation set is only populated when `tta` is set.
    pub fn new(image_size: u32, augmix: AugMixConfig, tta: bool) -> Result<Self, TransformError> {
        if image_size == 0 {
            return Err(TransformError::ZeroImageSize);
        }
        Ok(Self {
            image_size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            augmix: AugMix::new(augmix)?,
            rotations: if tta { TtaRotation::ALL.to_vec() } else { Vec::new() },
        })
    }

    pub fn has_tta(&self) -> bool {
        !self.rotations.is_empty()
    }

    /// Training chain.
    pub fn train<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> ImageTensor {
        let flipped;
        let image = if rng.random_bool(FLIP_PROBABILITY) {
            flipped = ops::flip_horizontal(image);
            &flipped
        } else {
            image
        };
        let resized = ops::resize_square(image, self.image_size);
        let mut tensor = self.augmix.apply(&ImageTensor::from_rgb(&resized), rng);
        tensor.normalize(&self.mean, &self.std);
        tensor
    }

    /// Validation / test chain.
    pub fn eval(&self, image: &RgbImage) -> ImageTensor {
        let resized = ops::resize_square(image, self.image_size);
        let mut tensor = ImageTensor::from_rgb(&resized);
        tensor.normalize(&self.mean, &self.std);
        tensor
    }

    /// Eval chain applied after each TTA rotation. Empty when TTA was not enabled.
    pub fn tta(&self, image: &RgbImage) -> BTreeMap<String, ImageTensor> {
        self.rotations
            .iter()
            .map(|&rotation| {
                let rotated = ops::rotate(image, rotation);
                (rotation.label().to_string(), self.eval(&rotated))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn eval_chain_resizes_and_normalizes() {
        let pipeline = TransformPipeline::new(16, AugMixConfig::default(), false).unwrap();
        let tensor = pipeline.eval(&solid(40, 30, 255));
        assert_eq!(tensor.shape(), [3, 16, 16]);
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!((tensor.get(c, 5, 5) - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn train_chain_keeps_target_shape() {
        let pipeline = TransformPipeline::new(12, AugMixConfig::default(), false).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..5 {
            let tensor = pipeline.train(&solid(20, 25, 128), &mut rng);
            assert_eq!(tensor.shape(), [3, 12, 12]);
            assert!(tensor.data().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn tta_only_built_when_enabled() {
        let image = solid(10, 10, 60);
        let without = TransformPipeline::new(8, AugMixConfig::default(), false).unwrap();
        assert!(!without.has_tta());
        assert!(without.tta(&image).is_empty());

        let with = TransformPipeline::new(8, AugMixConfig::default(), true).unwrap();
        let rotations = with.tta(&image);
        let keys: Vec<&str> = rotations.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["0", "180", "270", "90"]);
        assert!(rotations.values().all(|t| t.shape() == [3, 8, 8]));
    }

    #[test]
    fn zero_image_size_is_rejected() {
        assert!(matches!(
            TransformPipeline::new(0, AugMixConfig::default(), false),
            Err(TransformError::ZeroImageSize)
        ));
    }
}
