use super::{Derivative, ImageService};
use crate::Result;
use async_trait::async_trait;
use image::ImageFormat;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MockImageProcessor {
    process_count: Arc<Mutex<usize>>,
    output: Vec<u8>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockImageProcessor {
    pub fn new() -> Self {
        Self {
            process_count: Arc::new(Mutex::new(0)),
            output: b"mock derivative".to_vec(),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_output(mut self, output: Vec<u8>) -> Self {
        self.output = output;
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_process_count(&self) -> usize {
        *self.process_count.lock().unwrap()
    }
}

impl Default for MockImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageProcessor {
    async fn half_size(&self, _image_data: &[u8], extension: &str) -> Result<Derivative> {
        *self.process_count.lock().unwrap() += 1;

        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::Image(image::ImageError::IoError(
                std::io::Error::other("Mock failure"),
            )));
        }

        let format = ImageFormat::from_extension(extension).unwrap_or(ImageFormat::Png);
        Ok(Derivative {
            width: 1,
            height: 1,
            bytes: self.output.clone(),
            format,
        })
    }
}
