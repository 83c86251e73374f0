use std::path::Path;

use image::{DynamicImage, RgbImage};

use crate::error::Result;

/// Decodes an image file (PNG/JPEG/BMP/GIF) and converts it to RGB8.
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let img = image::open(path)?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// Writes an RGB image; the format follows the file extension.
pub fn save_image(image: &RgbImage, path: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image.save(path)?;
    Ok(())
}
