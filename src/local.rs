//! Local file persistence
//!
//! Writes request paths under a parent directory and computes where the
//! resized sibling of an image lives.

use crate::Result;
use std::path::{Path, PathBuf};

const IMAGES_SEGMENT: &str = "images";
const RESIZED_SEGMENT: &str = "resize_images";

pub struct FileBasedWriter {
    parent_dir: PathBuf,
}

impl FileBasedWriter {
    pub fn new(parent_dir: impl Into<PathBuf>) -> Self {
        Self {
            parent_dir: parent_dir.into(),
        }
    }

    /// Absolute paths are used as-is; relative ones land under the parent dir.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() || self.parent_dir.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            self.parent_dir.join(path)
        }
    }

    /// Write `data` for a request path and return where it landed.
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<PathBuf> {
        let target = self.resolve(path);
        self.write_to(&target, data).await?;
        Ok(target)
    }

    pub async fn write_to(&self, target: &Path, data: &[u8]) -> Result<()> {
        if let Some(dir) = target.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        tokio::fs::write(target, data).await?;
        Ok(())
    }

    /// Location of the resized copy of `path`.
    ///
    /// The first `images` in the request path becomes `resize_images`; failing
    /// that, the first one in the parent directory. Otherwise the copy goes in
    /// a `resize_images` directory beside the original.
    pub fn derivative_path(&self, path: &str) -> PathBuf {
        if path.contains(IMAGES_SEGMENT) {
            return self.resolve(&path.replacen(IMAGES_SEGMENT, RESIZED_SEGMENT, 1));
        }

        let relative = !Path::new(path).is_absolute();
        let parent = self.parent_dir.to_string_lossy();
        if relative && parent.contains(IMAGES_SEGMENT) {
            return PathBuf::from(parent.replacen(IMAGES_SEGMENT, RESIZED_SEGMENT, 1)).join(path);
        }

        let original = self.resolve(path);
        let dir = original.parent().map(Path::to_path_buf).unwrap_or_default();
        match original.file_name() {
            Some(name) => dir.join(RESIZED_SEGMENT).join(name),
            None => dir.join(RESIZED_SEGMENT),
        }
    }
}
