use image::RgbImage;

/// Channel-first (`[C, H, W]`) float image.
///
/// Produced by [`ImageTensor::from_rgb`] with values scaled to `[0, 1]`; after
/// normalization the values are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageTensor {
    /// A zero-filled tensor of the given shape.
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            data: vec![0.0; channels * height * width],
            channels,
            height,
            width,
        }
    }

    /// Wrap planar `[C, H, W]` data. Returns `None` when the length does not match the shape.
    pub fn from_planar(data: Vec<f32>, channels: usize, height: usize, width: usize) -> Option<Self> {
        (data.len() == channels * height * width).then_some(Self {
            data,
            channels,
            height,
            width,
        })
    }

    /// Convert interleaved 8-bit RGB into planar floats scaled to `[0, 1]`.
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let npix = width * height;
        let mut data = vec![0.0f32; 3 * npix];
        for (idx, pixel) in image.as_raw().chunks_exact(3).enumerate() {
            data[idx] = pixel[0] as f32 / 255.0;
            data[npix + idx] = pixel[1] as f32 / 255.0;
            data[2 * npix + idx] = pixel[2] as f32 / 255.0;
        }
        Self {
            data,
            channels: 3,
            height,
            width,
        }
    }

    /// `[channels, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Flat planar data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Borrow one channel plane.
    pub fn plane(&self, channel: usize) -> &[f32] {
        let len = self.height * self.width;
        &self.data[channel * len..(channel + 1) * len]
    }

    pub fn plane_mut(&mut self, channel: usize) -> &mut [f32] {
        let len = self.height * self.width;
        &mut self.data[channel * len..(channel + 1) * len]
    }

    /// Value at `(channel, y, x)`.
    pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[(channel * self.height + y) * self.width + x]
    }

    /// Apply `op` to every value in place.
    pub fn map_in_place(&mut self, op: impl Fn(f32) -> f32) {
        for value in &mut self.data {
            *value = op(*value);
        }
    }

    /// Per-channel `(value - mean) / std`.
    pub fn normalize(&mut self, mean: &[f32], std: &[f32]) {
        for channel in 0..self.channels.min(mean.len()).min(std.len()) {
            let (m, s) = (mean[channel], std[channel]);
            for value in self.plane_mut(channel) {
                *value = (*value - m) / s;
            }
        }
    }

    /// `(min, max)` over all values; `None` for an empty tensor.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Arithmetic mean of one channel.
    pub fn channel_mean(&self, channel: usize) -> f32 {
        let plane = self.plane(channel);
        if plane.is_empty() {
            return 0.0;
        }
        plane.iter().sum::<f32>() / plane.len() as f32
    }
}
