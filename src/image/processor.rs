use super::{Derivative, ImageService};
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

pub struct ImageProcessor {
    jpeg_quality: u8,
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    fn half_size_sync(data: Vec<u8>, extension: String, quality: u8) -> Result<Derivative> {
        let source_format = image::guess_format(&data)?;
        let img = image::load_from_memory_with_format(&data, source_format)?;

        let (width, height) = half_dimensions(img.width(), img.height());
        let resized = img.resize_exact(width, height, FilterType::Lanczos3);

        let format = output_format(&extension, source_format);
        let bytes = encode(&resized, format, quality)?;

        Ok(Derivative {
            width,
            height,
            bytes,
            format,
        })
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Half of each side, never below one pixel.
pub fn half_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

fn output_format(extension: &str, source_format: ImageFormat) -> ImageFormat {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => ImageFormat::Jpeg,
        _ => source_format,
    }
}

/// Alpha-composite over an opaque white background.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = if img.color().has_alpha() {
                flatten_onto_white(img)
            } else {
                img.to_rgb8()
            };
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;
        }
        other => img.write_to(&mut Cursor::new(&mut bytes), other)?,
    }
    Ok(bytes)
}

#[async_trait]
impl ImageService for ImageProcessor {
    async fn half_size(&self, image_data: &[u8], extension: &str) -> Result<Derivative> {
        let data = image_data.to_vec();
        let extension = extension.to_string();
        let quality = self.jpeg_quality;

        tokio::task::spawn_blocking(move || Self::half_size_sync(data, extension, quality))
            .await
            .map_err(|e| Error::Invariant(format!("Image processing task join error: {}", e)))?
    }
}
