use crate::error::{DepthError, Result};

/// Row-major single-channel depth estimate
#[derive(Clone, Debug, PartialEq)]
pub struct DepthField {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl DepthField {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DepthError::Model(format!(
                "empty depth field {}x{}",
                width, height
            )));
        }
        if values.len() != (width as usize) * (height as usize) {
            return Err(DepthError::Model(format!(
                "depth field {}x{} holds {} values",
                width,
                height,
                values.len()
            )));
        }

        Ok(DepthField {
            width,
            height,
            values,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width as usize + x]
    }

    /// Minimum and maximum value, `None` if any value is not finite
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;

        for &v in &self.values {
            if !v.is_finite() {
                return None;
            }
            min = min.min(v);
            max = max.max(v);
        }

        Some((min, max))
    }

    /// Bilinear resampling to `width` x `height`; corner samples are aligned,
    /// so the four corner values of the source are preserved.
    pub fn resize_bilinear(&self, width: u32, height: u32) -> DepthField {
        if (width, height) == self.dimensions() {
            return self.clone();
        }

        let scale = |src: u32, dst: u32| {
            if dst > 1 {
                (src - 1) as f32 / (dst - 1) as f32
            } else {
                0.0
            }
        };
        let sx = scale(self.width, width);
        let sy = scale(self.height, height);
        let max_x = self.width as usize - 1;
        let max_y = self.height as usize - 1;

        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let fy = y as f32 * sy;
            let y0 = (fy.floor() as usize).min(max_y);
            let y1 = (y0 + 1).min(max_y);
            let wy = fy - y0 as f32;

            for x in 0..width {
                let fx = x as f32 * sx;
                let x0 = (fx.floor() as usize).min(max_x);
                let x1 = (x0 + 1).min(max_x);
                let wx = fx - x0 as f32;

                let top = self.at(x0, y0) * (1.0 - wx) + self.at(x1, y0) * wx;
                let bottom = self.at(x0, y1) * (1.0 - wx) + self.at(x1, y1) * wx;
                values.push(top * (1.0 - wy) + bottom * wy);
            }
        }

        DepthField {
            width,
            height,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(DepthField::new(2, 2, vec![0.0; 3]).is_err());
        assert!(DepthField::new(0, 2, vec![]).is_err());
        assert!(DepthField::new(2, 2, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn min_max_rejects_non_finite() {
        let field = DepthField::new(3, 1, vec![2.0, -1.5, 7.25]).unwrap();
        assert_eq!(field.min_max(), Some((-1.5, 7.25)));

        let field = DepthField::new(2, 1, vec![1.0, f32::NAN]).unwrap();
        assert_eq!(field.min_max(), None);
    }

    #[test]
    fn upsample_preserves_corners_and_interpolates() {
        let field = DepthField::new(2, 2, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let up = field.resize_bilinear(3, 3);

        assert_eq!(up.dimensions(), (3, 3));
        assert_eq!(
            up.values,
            vec![0.0, 0.5, 1.0, 1.0, 1.5, 2.0, 2.0, 2.5, 3.0]
        );
    }

    #[test]
    fn downsample_to_single_pixel_takes_origin() {
        let field = DepthField::new(2, 2, vec![4.0, 1.0, 2.0, 3.0]).unwrap();
        let down = field.resize_bilinear(1, 1);

        assert_eq!(down.values, vec![4.0]);
    }

    #[test]
    fn upsample_keeps_range() {
        let values: Vec<f32> = (0..37 * 28).map(|i| (i % 97) as f32 * 0.3).collect();
        let field = DepthField::new(37, 28, values).unwrap();
        let (min, max) = field.min_max().unwrap();

        let up = field.resize_bilinear(640, 480);
        let (umin, umax) = up.min_max().unwrap();

        assert_eq!(up.values.len(), 640 * 480);
        assert!(umin >= min - 1e-4 && umax <= max + 1e-4);
    }
}
