//! AugMix augmentation over `[0, 1]` float tensors.
//!
//! Each call samples `mixture_width` chains of one to three randomly chosen
//! operations, blends the chains with Dirichlet weights and mixes the blend
//! back into the original with a Beta-distributed weight. Magnitudes come from
//! 11-bin tables indexed by `0..severity`, so the default severity of 3 only
//! ever picks the three mildest settings of each op.

use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};
use serde::{Deserialize, Serialize};

use super::TransformError;
use super::tensor::ImageTensor;

const NUM_BINS: u32 = 11;
const MAX_CHAIN_DEPTH: u32 = 3;

/// AugMix knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AugMixConfig {
    /// Upper bound (exclusive) of the magnitude bin, `1..=10`.
    #[serde(default = "default_severity")]
    pub severity: u32,
    /// Number of augmentation chains mixed together.
    #[serde(default = "default_mixture_width")]
    pub mixture_width: u32,
    /// Operations per chain; values `<= 0` draw a depth in `1..=3` per chain.
    #[serde(default = "default_chain_depth")]
    pub chain_depth: i32,
    /// Concentration of the Beta and Dirichlet mixing distributions.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

impl Default for AugMixConfig {
    fn default() -> Self {
        Self {
            severity: default_severity(),
            mixture_width: default_mixture_width(),
            chain_depth: default_chain_depth(),
            alpha: default_alpha(),
        }
    }
}

fn default_severity() -> u32 {
    3
}

fn default_mixture_width() -> u32 {
    3
}

fn default_chain_depth() -> i32 {
    -1
}

fn default_alpha() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AugOp {
    ShearX,
    ShearY,
    TranslateX,
    TranslateY,
    Rotate,
    Posterize,
    Solarize,
    AutoContrast,
    Equalize,
    Brightness,
    Color,
    Contrast,
    Sharpness,
}

const OPS: [AugOp; 13] = [
    AugOp::ShearX,
    AugOp::ShearY,
    AugOp::TranslateX,
    AugOp::TranslateY,
    AugOp::Rotate,
    AugOp::Posterize,
    AugOp::Solarize,
    AugOp::AutoContrast,
    AugOp::Equalize,
    AugOp::Brightness,
    AugOp::Color,
    AugOp::Contrast,
    AugOp::Sharpness,
];

impl AugOp {
    fn signed(self) -> bool {
        matches!(
            self,
            AugOp::ShearX
                | AugOp::ShearY
                | AugOp::TranslateX
                | AugOp::TranslateY
                | AugOp::Rotate
                | AugOp::Brightness
                | AugOp::Color
                | AugOp::Contrast
                | AugOp::Sharpness
        )
    }

    /// Unsigned magnitude for `bin`, or `None` for parameterless ops.
    fn magnitude(self, bin: u32, height: usize, width: usize) -> Option<f32> {
        let t = bin as f32 / (NUM_BINS - 1) as f32;
        let value = match self {
            AugOp::ShearX | AugOp::ShearY => 0.3 * t,
            AugOp::TranslateX => width as f32 / 3.0 * t,
            AugOp::TranslateY => height as f32 / 3.0 * t,
            AugOp::Rotate => 30.0 * t,
            AugOp::Posterize => 4.0 - (bin as f32 / ((NUM_BINS - 1) as f32 / 4.0)).round(),
            AugOp::Solarize => 1.0 - t,
            AugOp::Brightness | AugOp::Color | AugOp::Contrast | AugOp::Sharpness => 0.9 * t,
            AugOp::AutoContrast | AugOp::Equalize => return None,
        };
        Some(value)
    }

    fn apply(self, image: &ImageTensor, magnitude: f32) -> ImageTensor {
        match self {
            AugOp::ShearX => warp(image, |x, y| (x + magnitude * y, y)),
            AugOp::ShearY => warp(image, |x, y| (x, y + magnitude * x)),
            AugOp::TranslateX => {
                let shift = magnitude.trunc();
                warp(image, |x, y| (x - shift, y))
            }
            AugOp::TranslateY => {
                let shift = magnitude.trunc();
                warp(image, |x, y| (x, y - shift))
            }
            AugOp::Rotate => rotate_degrees(image, magnitude),
            AugOp::Posterize => posterize(image, magnitude as u32),
            AugOp::Solarize => solarize(image, magnitude),
            AugOp::AutoContrast => autocontrast(image),
            AugOp::Equalize => equalize(image),
            AugOp::Brightness => {
                let degenerate = ImageTensor::zeros(image.channels(), image.height(), image.width());
                blend(image, &degenerate, 1.0 + magnitude)
            }
            AugOp::Color => blend(image, &grayscale(image), 1.0 + magnitude),
            AugOp::Contrast => {
                let gray = grayscale(image);
                let mean = gray.channel_mean(0);
                let mut degenerate = image.clone();
                degenerate.map_in_place(|_| mean);
                blend(image, &degenerate, 1.0 + magnitude)
            }
            AugOp::Sharpness => blend(image, &smooth(image), 1.0 + magnitude),
        }
    }
}

/// Validated AugMix sampler.
#[derive(Debug, Clone)]
pub struct AugMix {
    config: AugMixConfig,
    mix_weight: Beta<f32>,
    chain_weight: Gamma<f32>,
}

impl AugMix {
    pub fn new(config: AugMixConfig) -> Result<Self, TransformError> {
        if !(1..NUM_BINS).contains(&config.severity) {
            return Err(TransformError::InvalidAugMix(format!(
                "severity must be in 1..={}, got {}",
                NUM_BINS - 1,
                config.severity
            )));
        }
        if config.mixture_width == 0 {
            return Err(TransformError::InvalidAugMix(
                "mixture_width must be at least 1".into(),
            ));
        }
        let mix_weight = Beta::new(config.alpha, config.alpha)
            .map_err(|err| TransformError::InvalidAugMix(format!("alpha: {err}")))?;
        let chain_weight = Gamma::new(config.alpha, 1.0)
            .map_err(|err| TransformError::InvalidAugMix(format!("alpha: {err}")))?;
        Ok(Self {
            config,
            mix_weight,
            chain_weight,
        })
    }

    /// Produce one augmented copy of `image`.
    pub fn apply<R: Rng + ?Sized>(&self, image: &ImageTensor, rng: &mut R) -> ImageTensor {
        let m = self.mix_weight.sample(rng);
        let chain_weights = self.sample_chain_weights(rng, 1.0 - m);

        let mut mixed = image.clone();
        mixed.map_in_place(|v| v * m);
        for weight in chain_weights {
            let augmented = self.run_chain(image, rng);
            for (out, value) in mixed.data_mut().iter_mut().zip(augmented.data()) {
                *out += weight * value;
            }
        }
        mixed
    }

    fn sample_chain_weights<R: Rng + ?Sized>(&self, rng: &mut R, scale: f32) -> Vec<f32> {
        let width = self.config.mixture_width as usize;
        let draws: Vec<f32> = (0..width).map(|_| self.chain_weight.sample(rng)).collect();
        let total: f32 = draws.iter().sum();
        if total <= f32::EPSILON {
            return vec![scale / width as f32; width];
        }
        draws.into_iter().map(|d| d / total * scale).collect()
    }

    fn run_chain<R: Rng + ?Sized>(&self, image: &ImageTensor, rng: &mut R) -> ImageTensor {
        let depth = if self.config.chain_depth > 0 {
            self.config.chain_depth as u32
        } else {
            rng.random_range(1..=MAX_CHAIN_DEPTH)
        };
        let mut current = image.clone();
        for _ in 0..depth {
            let op = OPS[rng.random_range(0..OPS.len())];
            let bin = rng.random_range(0..self.config.severity);
            let mut magnitude = op
                .magnitude(bin, current.height(), current.width())
                .unwrap_or(0.0);
            if op.signed() && rng.random_bool(0.5) {
                magnitude = -magnitude;
            }
            current = op.apply(&current, magnitude);
        }
        current
    }
}

/// Inverse-mapped nearest-neighbour warp with zero fill.
fn warp(image: &ImageTensor, source_of: impl Fn(f32, f32) -> (f32, f32)) -> ImageTensor {
    let [channels, height, width] = image.shape();
    let mut out = ImageTensor::zeros(channels, height, width);
    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = source_of(x as f32, y as f32);
            let (sx, sy) = (sx.round(), sy.round());
            if sx < 0.0 || sy < 0.0 || sx as usize >= width || sy as usize >= height {
                continue;
            }
            let (sx, sy) = (sx as usize, sy as usize);
            for c in 0..channels {
                out.data_mut()[(c * height + y) * width + x] = image.get(c, sy, sx);
            }
        }
    }
    out
}

fn rotate_degrees(image: &ImageTensor, degrees: f32) -> ImageTensor {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (image.width() as f32 - 1.0) / 2.0;
    let cy = (image.height() as f32 - 1.0) / 2.0;
    warp(image, |x, y| {
        let (ex, ey) = (x - cx, y - cy);
        (cx + ex * cos - ey * sin, cy + ex * sin + ey * cos)
    })
}

fn posterize(image: &ImageTensor, bits: u32) -> ImageTensor {
    let levels = (1u32 << bits.min(8)) as f32;
    let mut out = image.clone();
    out.map_in_place(|v| (v * levels).floor().clamp(0.0, levels - 1.0) / levels);
    out
}

fn solarize(image: &ImageTensor, threshold: f32) -> ImageTensor {
    let mut out = image.clone();
    out.map_in_place(|v| if v >= threshold { 1.0 - v } else { v });
    out
}

fn autocontrast(image: &ImageTensor) -> ImageTensor {
    let mut out = image.clone();
    for c in 0..out.channels() {
        let plane = out.plane_mut(c);
        let (lo, hi) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if hi - lo <= f32::EPSILON {
            continue;
        }
        let range = hi - lo;
        for value in plane {
            *value = ((*value - lo) / range).clamp(0.0, 1.0);
        }
    }
    out
}

/// Histogram equalization on an 8-bit quantization of each channel.
fn equalize(image: &ImageTensor) -> ImageTensor {
    let mut out = image.clone();
    for c in 0..out.channels() {
        let plane = out.plane_mut(c);
        let levels: Vec<usize> = plane
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as usize)
            .collect();
        let mut hist = [0usize; 256];
        for &level in &levels {
            hist[level] += 1;
        }
        let last_nonzero = hist.iter().rposition(|&n| n > 0).map(|i| hist[i]).unwrap_or(0);
        let step = (levels.len() - last_nonzero) / 255;
        if step == 0 {
            continue;
        }
        let mut lut = [0u8; 256];
        let mut acc = step / 2;
        for (level, count) in hist.iter().enumerate() {
            lut[level] = (acc / step).min(255) as u8;
            acc += count;
        }
        for (value, level) in plane.iter_mut().zip(levels) {
            *value = lut[level] as f32 / 255.0;
        }
    }
    out
}

fn grayscale(image: &ImageTensor) -> ImageTensor {
    let [channels, height, width] = image.shape();
    if channels < 3 {
        return image.clone();
    }
    let mut gray = ImageTensor::zeros(channels, height, width);
    let (r, g, b) = (image.plane(0), image.plane(1), image.plane(2));
    let luma: Vec<f32> = (0..height * width)
        .map(|i| 0.2989 * r[i] + 0.587 * g[i] + 0.114 * b[i])
        .collect();
    for c in 0..channels {
        gray.plane_mut(c).copy_from_slice(&luma);
    }
    gray
}

/// 3x3 smoothing used as the sharpness degenerate; border pixels are kept.
fn smooth(image: &ImageTensor) -> ImageTensor {
    let [channels, height, width] = image.shape();
    let mut out = image.clone();
    if height <= 2 || width <= 2 {
        return out;
    }
    for c in 0..channels {
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let mut acc = 0.0;
                for dy in 0..3 {
                    for dx in 0..3 {
                        let weight = if dx == 1 && dy == 1 { 5.0 } else { 1.0 };
                        acc += weight * image.get(c, y + dy - 1, x + dx - 1);
                    }
                }
                out.data_mut()[(c * height + y) * width + x] = acc / 13.0;
            }
        }
    }
    out
}

/// `clamp(factor * image + (1 - factor) * degenerate, 0, 1)`.
fn blend(image: &ImageTensor, degenerate: &ImageTensor, factor: f32) -> ImageTensor {
    let mut out = image.clone();
    for (value, base) in out.data_mut().iter_mut().zip(degenerate.data()) {
        *value = (factor * *value + (1.0 - factor) * base).clamp(0.0, 1.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn gradient(height: usize, width: usize) -> ImageTensor {
        let mut data = Vec::with_capacity(3 * height * width);
        for c in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    data.push(((x + y + c) % 11) as f32 / 10.0);
                }
            }
        }
        ImageTensor::from_planar(data, 3, height, width).unwrap()
    }

    #[test]
    fn output_keeps_shape_and_stays_in_unit_range() {
        let augmix = AugMix::new(AugMixConfig::default()).unwrap();
        let image = gradient(12, 9);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..25 {
            let out = augmix.apply(&image, &mut rng);
            assert_eq!(out.shape(), image.shape());
            let (lo, hi) = out.value_range().unwrap();
            assert!(lo >= -1e-5 && hi <= 1.0 + 1e-5, "range {lo}..{hi}");
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let augmix = AugMix::new(AugMixConfig::default()).unwrap();
        let image = gradient(8, 8);
        let a = augmix.apply(&image, &mut StdRng::seed_from_u64(42));
        let b = augmix.apply(&image, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let bad_severity = AugMixConfig {
            severity: 0,
            ..AugMixConfig::default()
        };
        assert!(AugMix::new(bad_severity).is_err());
        let bad_alpha = AugMixConfig {
            alpha: 0.0,
            ..AugMixConfig::default()
        };
        assert!(AugMix::new(bad_alpha).is_err());
    }

    #[test]
    fn chain_weights_sum_to_scale() {
        let augmix = AugMix::new(AugMixConfig::default()).unwrap();
        let weights = augmix.sample_chain_weights(&mut StdRng::seed_from_u64(3), 0.4);
        assert_eq!(weights.len(), 3);
        assert!((weights.iter().sum::<f32>() - 0.4).abs() < 1e-5);
    }

    #[test]
    fn magnitude_tables_match_reference_bins() {
        assert_eq!(AugOp::Posterize.magnitude(0, 1, 1), Some(4.0));
        assert_eq!(AugOp::Posterize.magnitude(2, 1, 1), Some(3.0));
        assert_eq!(AugOp::Posterize.magnitude(10, 1, 1), Some(0.0));
        assert_eq!(AugOp::Solarize.magnitude(0, 1, 1), Some(1.0));
        assert!((AugOp::Rotate.magnitude(10, 1, 1).unwrap() - 30.0).abs() < 1e-5);
        assert!((AugOp::TranslateX.magnitude(10, 4, 9).unwrap() - 3.0).abs() < 1e-5);
        assert_eq!(AugOp::Equalize.magnitude(1, 1, 1), None);
    }

    #[test]
    fn pointwise_ops_behave() {
        let image = ImageTensor::from_planar(vec![0.2, 0.6, 0.2, 0.6, 0.2, 0.6], 3, 1, 2).unwrap();

        let solarized = solarize(&image, 0.5);
        assert!((solarized.get(0, 0, 1) - 0.4).abs() < 1e-6);
        assert!((solarized.get(0, 0, 0) - 0.2).abs() < 1e-6);

        let stretched = autocontrast(&image);
        assert_eq!(stretched.plane(0), &[0.0, 1.0]);

        let posterized = posterize(&image, 1);
        assert_eq!(posterized.plane(0), &[0.0, 0.5]);

        let dark = AugOp::Brightness.apply(&image, -0.5);
        assert!((dark.get(0, 0, 1) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn translate_shifts_with_zero_fill() {
        let image = ImageTensor::from_planar(vec![1.0, 2.0, 3.0], 1, 1, 3).unwrap();
        let shifted = AugOp::TranslateX.apply(&image, 1.0);
        assert_eq!(shifted.data(), &[0.0, 1.0, 2.0]);
    }
}
