//! Pixel-space building blocks for the transform chains.

use image::{Rgb, RgbImage, imageops, imageops::FilterType};

/// Fixed TTA rotations, counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TtaRotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl TtaRotation {
    /// All rotations in ascending angle order.
    pub const ALL: [TtaRotation; 4] = [
        TtaRotation::Deg0,
        TtaRotation::Deg90,
        TtaRotation::Deg180,
        TtaRotation::Deg270,
    ];

    /// Key used in the TTA output map.
    pub fn label(self) -> &'static str {
        match self {
            TtaRotation::Deg0 => "0",
            TtaRotation::Deg90 => "90",
            TtaRotation::Deg180 => "180",
            TtaRotation::Deg270 => "270",
        }
    }
}

/// Mirror left-to-right.
pub fn flip_horizontal(image: &RgbImage) -> RgbImage {
    imageops::flip_horizontal(image)
}

/// Resize to an exact square, ignoring aspect ratio.
pub fn resize_square(image: &RgbImage, size: u32) -> RgbImage {
    if image.width() == size && image.height() == size {
        return image.clone();
    }
    imageops::resize(image, size, size, FilterType::Triangle)
}

/// Rotate about the image centre keeping the canvas size.
///
/// Pixels that fall outside the source are black. Square images rotate
/// losslessly; for other shapes the corners are clipped.
pub fn rotate(image: &RgbImage, rotation: TtaRotation) -> RgbImage {
    let square = image.width() == image.height();
    match rotation {
        TtaRotation::Deg0 => image.clone(),
        TtaRotation::Deg180 => imageops::rotate180(image),
        TtaRotation::Deg90 if square => imageops::rotate270(image),
        TtaRotation::Deg270 if square => imageops::rotate90(image),
        TtaRotation::Deg90 => rotate_quarter_clipped(image, true),
        TtaRotation::Deg270 => rotate_quarter_clipped(image, false),
    }
}

fn rotate_quarter_clipped(image: &RgbImage, counter_clockwise: bool) -> RgbImage {
    let (width, height) = image.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let mut out = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    for y in 0..height {
        for x in 0..width {
            let ex = x as f32 - cx;
            let ey = y as f32 - cy;
            let (sx, sy) = if counter_clockwise {
                (cx - ey, cy + ex)
            } else {
                (cx + ey, cy - ex)
            };
            let (sx, sy) = (sx.round(), sy.round());
            if sx >= 0.0 && sy >= 0.0 && (sx as u32) < width && (sy as u32) < height {
                out.put_pixel(x, y, *image.get_pixel(sx as u32, sy as u32));
            }
        }
    }
    out
}
