use std::fmt;
use std::str::FromStr;

use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use serde::{Serialize, Deserialize};

use crate::error::{Result, StyleError};
use crate::math::tensor::Tensor;

/// Per-channel RGB mean of the data the pretrained network was trained on.
pub const RGB_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel RGB standard deviation matching `RGB_MEAN`.
pub const RGB_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Target image size. Always `(height, width)`; the `image` crate is called
/// with `(width, height)` internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
}

impl ImageShape {
    pub fn new(height: u32, width: u32) -> Self {
        ImageShape { height, width }
    }

    pub fn validate(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(StyleError::InvalidShape { height: self.height, width: self.width });
        }
        Ok(())
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Parses `"HEIGHTxWIDTH"`, e.g. `"300x450"`.
impl FromStr for ImageShape {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (h, w) = s.split_once(['x', 'X'])
            .ok_or_else(|| format!("expected HEIGHTxWIDTH, got '{s}'"))?;
        let height = h.trim().parse::<u32>().map_err(|e| format!("bad height '{h}': {e}"))?;
        let width = w.trim().parse::<u32>().map_err(|e| format!("bad width '{w}': {e}"))?;
        Ok(ImageShape { height, width })
    }
}

/// Resizes `image` to `shape` and normalizes each channel as
/// `(pixel / 255 − mean) / std`.
///
/// Returns a `[1, 3, height, width]` tensor.
pub fn preprocess(image: &DynamicImage, shape: ImageShape) -> Result<Tensor> {
    shape.validate()?;
    let channels = image.color().channel_count();
    if channels != 3 {
        return Err(StyleError::ChannelCount(channels));
    }

    let resized = image.resize_exact(shape.width, shape.height, FilterType::Lanczos3).to_rgb8();
    let (h, w) = (shape.height as usize, shape.width as usize);
    let mut tensor = Tensor::zeros([1, 3, h, w]);
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            let offset = tensor.offset(0, c, y as usize, x as usize);
            tensor.data[offset] = (value - RGB_MEAN[c]) / RGB_STD[c];
        }
    }
    Ok(tensor)
}

/// Undoes the normalization and clamps to the display range `[0, 1]`.
pub fn denormalize(tensor: &Tensor) -> Result<Tensor> {
    check_image_tensor(tensor)?;
    let plane = tensor.height() * tensor.width();
    let data = tensor.data.iter().enumerate()
        .map(|(i, &v)| {
            let c = i / plane;
            (v * RGB_STD[c] + RGB_MEAN[c]).clamp(0.0, 1.0)
        })
        .collect();
    Ok(Tensor { shape: tensor.shape, data })
}

/// Converts a normalized `[1, 3, h, w]` tensor back into an 8-bit RGB image.
pub fn postprocess(tensor: &Tensor) -> Result<RgbImage> {
    let display = denormalize(tensor)?;
    let (h, w) = (display.height(), display.width());
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let channel = |c: usize| (display.get(0, c, y, x) * 255.0).round() as u8;
        Rgb([channel(0), channel(1), channel(2)])
    }))
}

/// Re-renders a normalized image tensor at another resolution, e.g. to seed
/// a full-size run from a smaller one.
pub fn resample(tensor: &Tensor, shape: ImageShape) -> Result<Tensor> {
    let image = DynamicImage::ImageRgb8(postprocess(tensor)?);
    preprocess(&image, shape)
}

fn check_image_tensor(tensor: &Tensor) -> Result<()> {
    if tensor.batch() != 1 || tensor.channels() != 3 {
        return Err(StyleError::ShapeMismatch {
            operation: "postprocess",
            expected: [1, 3, tensor.height(), tensor.width()],
            got: tensor.shape,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
        }))
    }

    #[test]
    fn preprocess_produces_batched_chw() {
        let t = preprocess(&gradient(40, 20), ImageShape::new(8, 12)).unwrap();
        assert_eq!(t.shape, [1, 3, 8, 12]);
    }

    #[test]
    fn round_trip_keeps_shape_and_display_range() {
        let shape = ImageShape::new(10, 7);
        let t = preprocess(&gradient(33, 21), shape).unwrap();
        let img = postprocess(&t).unwrap();
        assert_eq!((img.height(), img.width()), (10, 7));

        let drifted = t.map(|v| v * 4.0 - 1.0);
        let display = denormalize(&drifted).unwrap();
        assert!(display.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn mean_colour_normalizes_to_about_zero() {
        let pixel = Rgb([124u8, 116, 104]);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, pixel));
        let t = preprocess(&img, ImageShape::new(4, 4)).unwrap();
        assert!(t.data.iter().all(|v| v.abs() < 0.03), "{:?}", &t.data[..3]);
    }

    #[test]
    fn constant_image_survives_round_trip() {
        let pixel = Rgb([200u8, 30, 90]);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 5, pixel));
        let out = postprocess(&preprocess(&img, ImageShape::new(5, 6)).unwrap()).unwrap();
        for p in out.pixels() {
            for c in 0..3 {
                assert!((p.0[c] as i32 - pixel.0[c] as i32).abs() <= 1);
            }
        }
    }

    #[test]
    fn zero_shape_is_rejected() {
        let err = preprocess(&gradient(4, 4), ImageShape::new(0, 4)).unwrap_err();
        assert!(matches!(err, StyleError::InvalidShape { height: 0, width: 4 }));
    }

    #[test]
    fn non_rgb_inputs_are_rejected() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([9])));
        assert!(matches!(preprocess(&gray, ImageShape::new(3, 3)), Err(StyleError::ChannelCount(1))));
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 4])));
        assert!(matches!(preprocess(&rgba, ImageShape::new(3, 3)), Err(StyleError::ChannelCount(4))));
    }

    #[test]
    fn postprocess_rejects_feature_maps() {
        assert!(postprocess(&Tensor::zeros([1, 4, 2, 2])).is_err());
    }

    #[test]
    fn resample_changes_resolution() {
        let t = preprocess(&gradient(16, 16), ImageShape::new(6, 9)).unwrap();
        let up = resample(&t, ImageShape::new(12, 18)).unwrap();
        assert_eq!(up.shape, [1, 3, 12, 18]);
    }

    #[test]
    fn shape_parses_height_by_width() {
        assert_eq!("300x450".parse::<ImageShape>().unwrap(), ImageShape::new(300, 450));
        assert!("300".parse::<ImageShape>().is_err());
    }
}
