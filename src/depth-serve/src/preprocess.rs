//! Conversion of decoded images into the tensor the depth network expects.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::RgbImage;

/// ImageNet channel statistics the network was trained with
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Patch size of the ViT backbone; model input sides must be a multiple of it
pub const PATCH_MULTIPLE: u32 = 14;

/// Memory order of the model input tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 3, h, w]`
    Nchw,
    /// `[1, h, w, 3]`
    Nhwc,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nchw" => Ok(TensorLayout::Nchw),
            "nhwc" => Ok(TensorLayout::Nhwc),
            other => Err(format!("unknown tensor layout '{}', expected nchw or nhwc", other)),
        }
    }
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorLayout::Nchw => write!(f, "nchw"),
            TensorLayout::Nhwc => write!(f, "nhwc"),
        }
    }
}

/// A normalized, batched image ready to be fed to the network
#[derive(Clone, Debug)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    pub layout: TensorLayout,
    pub data: Vec<f32>,
}

impl ModelInput {
    pub fn dims(&self) -> [u64; 4] {
        let (w, h) = (self.width as u64, self.height as u64);
        match self.layout {
            TensorLayout::Nchw => [1, 3, h, w],
            TensorLayout::Nhwc => [1, h, w, 3],
        }
    }
}

fn constrain_to_multiple(x: f64, multiple: u32, min_val: u32) -> u32 {
    let m = multiple as f64;
    let mut y = ((x / m).round() * m) as u32;
    if y < min_val {
        y = ((x / m).ceil() * m) as u32;
    }
    y
}

/// Model resolution for a `width` x `height` image.
///
/// Keeps the aspect ratio, scales so that both sides are at least
/// `input_size`, and snaps each side to a multiple of `multiple`.
pub fn target_size(width: u32, height: u32, input_size: u32, multiple: u32) -> (u32, u32) {
    let scale_w = input_size as f64 / width as f64;
    let scale_h = input_size as f64 / height as f64;
    let scale = scale_w.max(scale_h);

    (
        constrain_to_multiple(scale * width as f64, multiple, input_size),
        constrain_to_multiple(scale * height as f64, multiple, input_size),
    )
}

/// Resize, normalize and lay out `image` for the network
pub fn prepare(image: &RgbImage, input_size: u32, layout: TensorLayout) -> ModelInput {
    let (width, height) = target_size(image.width(), image.height(), input_size, PATCH_MULTIPLE);
    let resized = imageops::resize(image, width, height, FilterType::CatmullRom);

    let plane = (width * height) as usize;
    let mut data = vec![0f32; plane * 3];

    for (i, px) in resized.pixels().enumerate() {
        for c in 0..3 {
            let v = (px[c] as f32 / 255f32 - MEAN[c]) / STD[c];
            match layout {
                TensorLayout::Nchw => data[c * plane + i] = v,
                TensorLayout::Nhwc => data[i * 3 + c] = v,
            }
        }
    }

    ModelInput {
        width,
        height,
        layout,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn square_image_maps_to_input_size() {
        assert_eq!(target_size(518, 518, 518, 14), (518, 518));
        assert_eq!(target_size(100, 100, 518, 14), (518, 518));
    }

    #[test]
    fn landscape_keeps_short_side_at_input_size() {
        // short side scales to 518, long side 690.67 snaps to 686
        let (w, h) = target_size(640, 480, 518, 14);
        assert_eq!(h, 518);
        assert_eq!(w, 686);
        assert_eq!(w % 14, 0);
    }

    #[test]
    fn rounding_never_goes_below_input_size() {
        for (w, h) in [(1920, 1080), (1080, 1920), (333, 517), (4000, 3000)] {
            let (tw, th) = target_size(w, h, 518, 14);
            assert!(tw >= 518 && th >= 518, "{}x{} -> {}x{}", w, h, tw, th);
            assert_eq!(tw % 14, 0);
            assert_eq!(th % 14, 0);
        }
    }

    #[test]
    fn normalizes_channels_in_both_layouts() {
        let img = RgbImage::from_pixel(28, 28, Rgb([255, 0, 128]));

        let nchw = prepare(&img, 28, TensorLayout::Nchw);
        assert_eq!(nchw.dims(), [1, 3, 28, 28]);
        let plane = 28 * 28;
        assert!((nchw.data[0] - (1.0 - MEAN[0]) / STD[0]).abs() < 0.02);
        assert!((nchw.data[plane] - (0.0 - MEAN[1]) / STD[1]).abs() < 0.02);

        let nhwc = prepare(&img, 28, TensorLayout::Nhwc);
        assert_eq!(nhwc.dims(), [1, 28, 28, 3]);
        assert_eq!(nhwc.data.len(), nchw.data.len());
        assert!((nhwc.data[0] - nchw.data[0]).abs() < 1e-6);
        assert!((nhwc.data[1] - nchw.data[plane]).abs() < 1e-6);
        assert!((nhwc.data[2] - nchw.data[2 * plane]).abs() < 1e-6);
    }

    #[test]
    fn layout_parses_case_insensitively() {
        assert_eq!("NHWC".parse::<TensorLayout>().unwrap(), TensorLayout::Nhwc);
        assert_eq!("nchw".parse::<TensorLayout>().unwrap(), TensorLayout::Nchw);
        assert!("hwc".parse::<TensorLayout>().is_err());
    }
}
