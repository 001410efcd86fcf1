//! Half-resolution derivatives for raster images
//!
//! Decodes an uploaded image, halves both dimensions and re-encodes it in a
//! format matching the source file's extension.

pub mod mock;
pub mod processor;

pub use mock::MockImageProcessor;
pub use processor::ImageProcessor;

use crate::Result;
use async_trait::async_trait;
use image::ImageFormat;
use std::path::Path;

/// Extensions that trigger derivative generation.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Debug, Clone)]
pub struct Derivative {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_image_extension(extension: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Produce a half-size copy of `image_data`. `extension` is the source
    /// file's extension and selects the output encoding.
    async fn half_size(&self, image_data: &[u8], extension: &str) -> Result<Derivative>;
}
