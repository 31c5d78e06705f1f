use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{ColorType, GrayImage, ImageEncoder};
use log::warn;

use crate::depth::DepthField;
use crate::error::{DepthError, Result};

/// Gray level used when the depth field carries no range at all
pub const FLAT_DEPTH_LEVEL: u8 = 128;

/// Linearly map the depth range onto 0..=255 (truncating).
///
/// A constant field maps to `FLAT_DEPTH_LEVEL`; non-finite values are an error.
pub fn normalize(depth: &DepthField) -> Result<GrayImage> {
    let (min, max) = depth
        .min_max()
        .ok_or_else(|| DepthError::Encoding("depth field contains non-finite values".into()))?;

    let range = max - min;
    let pixels: Vec<u8> = if range > 0.0 {
        depth
            .values
            .iter()
            .map(|&v| ((v - min) / range * 255.0) as u8)
            .collect()
    } else {
        warn!("Constant depth field ({}), emitting flat image", min);
        vec![FLAT_DEPTH_LEVEL; depth.values.len()]
    };

    GrayImage::from_raw(depth.width, depth.height, pixels).ok_or_else(|| {
        DepthError::Encoding(format!(
            "pixel buffer does not fit {}x{}",
            depth.width, depth.height
        ))
    })
}

/// Encode an 8-bit grayscale image as PNG
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = vec![];
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::L8,
    )?;
    Ok(buf)
}

pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Full encoding stage: normalize, PNG, base64
pub fn depth_to_base64_png(depth: &DepthField) -> Result<String> {
    let gray = normalize(depth)?;
    let png = encode_png(&gray)?;
    Ok(encode_base64(&png))
}
