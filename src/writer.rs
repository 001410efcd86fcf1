//! Local writer that mirrors each file to COS.

use crate::config::UploadConfig;
use crate::cos::{ObjectMetadata, ObjectStore, COS_META_PREFIX};
use crate::image::{extension_of, is_image_extension, Derivative, ImageProcessor, ImageService};
use crate::local::FileBasedWriter;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Persists files locally and, when configured, uploads them to COS.
///
/// Only the local write can fail. Resize and upload problems are logged and
/// surface as a `None` URL.
pub struct CosDataWriter {
    local: FileBasedWriter,
    config: UploadConfig,
    store: Option<Box<dyn ObjectStore>>,
    image: Box<dyn ImageService>,
}

impl CosDataWriter {
    /// Build a writer from concrete collaborators.
    ///
    /// `store` is dropped when the config has upload disabled, so a disabled
    /// writer never touches the network.
    pub fn with_services(
        local: FileBasedWriter,
        config: UploadConfig,
        store: Option<Box<dyn ObjectStore>>,
        image: Box<dyn ImageService>,
    ) -> Self {
        let store = if config.upload_enabled() {
            if store.is_none() {
                warn!("No COS client available, upload disabled");
            }
            store
        } else {
            None
        };

        Self {
            local,
            config,
            store,
            image,
        }
    }

    /// Build a writer rooted at `parent_dir`, connecting to COS when the
    /// config allows it. Never fails: a client that cannot be built leaves
    /// the writer in local-only mode.
    pub async fn new(parent_dir: impl Into<PathBuf>, config: UploadConfig) -> Self {
        let store = if config.upload_enabled() {
            connect(&config).await
        } else {
            None
        };

        Self::with_services(
            FileBasedWriter::new(parent_dir),
            config,
            store,
            Box::new(ImageProcessor::new()),
        )
    }

    pub fn upload_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Object key for [`Self::write`]: basename for absolute paths, the
    /// slash-normalized relative path otherwise.
    pub fn object_key(&self, path: &str) -> String {
        if Path::new(path).is_absolute() {
            format!("{}{}", self.config.key_prefix(), basename(path))
        } else {
            format!("{}{}", self.config.key_prefix(), path.replace('\\', "/"))
        }
    }

    /// Object key for [`Self::write_with_metadata`], always the basename.
    pub fn metadata_object_key(&self, path: &str) -> String {
        format!("{}{}", self.config.key_prefix(), basename(path))
    }

    /// Write `data` to `path` and upload it (or its half-size derivative for
    /// images). Returns the object URL when the upload succeeded.
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<Option<String>> {
        self.local.write(path, data).await?;

        let derivative = self.derive_and_store(path, data).await;

        let Some(store) = &self.store else {
            return Ok(None);
        };

        let key = self.object_key(path);
        let payload = match derivative {
            Some(derivative) => derivative.bytes,
            None => data.to_vec(),
        };

        Ok(self
            .upload(store.as_ref(), &key, payload, &ObjectMetadata::new())
            .await)
    }

    /// Write `data` to `path` and upload the original bytes with metadata.
    ///
    /// Nothing is uploaded when `metadata` is empty. Images are not resized
    /// on this path.
    pub async fn write_with_metadata(
        &self,
        path: &str,
        data: &[u8],
        metadata: &HashMap<String, Value>,
    ) -> Result<Option<String>> {
        self.local.write(path, data).await?;

        let Some(store) = &self.store else {
            return Ok(None);
        };
        if metadata.is_empty() {
            debug!("No metadata for {}, skipping upload", path);
            return Ok(None);
        }

        let key = self.metadata_object_key(path);
        let headers = cos_metadata(metadata);

        Ok(self
            .upload(store.as_ref(), &key, data.to_vec(), &headers)
            .await)
    }

    async fn derive_and_store(&self, path: &str, data: &[u8]) -> Option<Derivative> {
        let extension = extension_of(path)?;
        if !is_image_extension(&extension) {
            return None;
        }

        let derivative = match self.image.half_size(data, &extension).await {
            Ok(derivative) => derivative,
            Err(e) => {
                warn!("Failed to resize {}, keeping original: {}", path, e);
                return None;
            }
        };

        let target = self.local.derivative_path(path);
        if let Err(e) = self.local.write_to(&target, &derivative.bytes).await {
            warn!(
                "Failed to save resized image {}, keeping original: {}",
                target.display(),
                e
            );
            return None;
        }

        info!(
            "Resized {} to {}x{} at {}",
            path,
            derivative.width,
            derivative.height,
            target.display()
        );
        Some(derivative)
    }

    async fn upload(
        &self,
        store: &dyn ObjectStore,
        key: &str,
        body: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Option<String> {
        let size = body.len();
        match store.put_object(key, body, metadata).await {
            Ok(()) => {
                let url = self.config.object_url(key);
                info!(key = %key, size_bytes = size, "Uploaded to COS: {}", url);
                Some(url)
            }
            Err(e) => {
                error!(key = %key, size_bytes = size, "Failed to upload to COS: {}", e);
                None
            }
        }
    }
}

#[cfg(feature = "cos")]
async fn connect(config: &UploadConfig) -> Option<Box<dyn ObjectStore>> {
    match crate::cos::CosClient::from_config(config).await {
        Ok(client) => {
            info!("COS client initialized for bucket: {}", config.bucket());
            Some(Box::new(client))
        }
        Err(e) => {
            warn!("Failed to initialize COS client, upload disabled: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "cos"))]
async fn connect(_config: &UploadConfig) -> Option<Box<dyn ObjectStore>> {
    warn!("Built without COS support, upload disabled");
    None
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Namespace user metadata under `x-cos-meta-` with stringified values.
pub fn cos_metadata(metadata: &HashMap<String, Value>) -> ObjectMetadata {
    metadata
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (format!("{}{}", COS_META_PREFIX, key), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadOptions;
    use crate::cos::MockCosClient;
    use crate::image::MockImageProcessor;
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::tempdir;

    const BUCKET: &str = "docs-1250000000";

    fn test_config(enable_upload: bool) -> UploadConfig {
        UploadConfig::resolve(
            UploadOptions {
                secret_id: Some("AKIDtestsecretid".to_string()),
                secret_key: Some("testsecretkey".to_string()),
                bucket: Some(BUCKET.to_string()),
                enable_upload: Some(enable_upload),
                ..Default::default()
            },
            |_| None,
        )
    }

    fn build_writer(
        parent_dir: &Path,
        config: UploadConfig,
        store: &MockCosClient,
        image: Box<dyn ImageService>,
    ) -> CosDataWriter {
        CosDataWriter::with_services(
            FileBasedWriter::new(parent_dir),
            config,
            Some(Box::new(store.clone())),
            image,
        )
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 128, 255, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_png_write_resizes_and_uploads_derivative() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            dir.path(),
            test_config(true),
            &store,
            Box::new(ImageProcessor::new()),
        );
        let original = png_bytes(200, 100);

        let url = writer.write("images/a.png", &original).await.unwrap();

        assert_eq!(
            url.as_deref(),
            Some("https://docs-1250000000.cos.ap-guangzhou.myqcloud.com/mineru/images/a.png")
        );
        assert_eq!(
            std::fs::read(dir.path().join("images/a.png")).unwrap(),
            original
        );

        let resized_path = dir.path().join("resize_images/a.png");
        let resized = image::open(&resized_path).unwrap();
        assert_eq!(resized.dimensions(), (100, 50));

        let uploaded = store.get_object("mineru/images/a.png").unwrap();
        assert_eq!(uploaded.body, std::fs::read(&resized_path).unwrap());
        assert!(uploaded.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_images_parent_dir_resizes_into_sibling_tree() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            &dir.path().join("images"),
            test_config(true),
            &store,
            Box::new(ImageProcessor::new()),
        );

        let url = writer.write("a.png", &png_bytes(200, 100)).await.unwrap();

        assert!(url.unwrap().ends_with(".myqcloud.com/mineru/a.png"));
        let resized = image::open(dir.path().join("resize_images/a.png")).unwrap();
        assert_eq!(resized.dimensions(), (100, 50));
        assert!(dir.path().join("images/a.png").exists());
    }

    #[tokio::test]
    async fn test_absolute_path_uses_basename_key() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            Path::new("ignored"),
            test_config(true),
            &store,
            Box::new(MockImageProcessor::new()),
        );
        let target = dir.path().join("deep/er/path/b.jpg");

        let url = writer
            .write(target.to_str().unwrap(), b"jpeg bytes")
            .await
            .unwrap();

        assert!(url.unwrap().ends_with("/mineru/b.jpg"));
        assert_eq!(store.get_keys(), vec!["mineru/b.jpg".to_string()]);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_upload_disabled_makes_no_store_calls() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            dir.path(),
            test_config(false),
            &store,
            Box::new(MockImageProcessor::new()),
        );

        let url = writer.write("doc.txt", b"text").await.unwrap();

        assert!(url.is_none());
        assert!(!writer.upload_enabled());
        assert_eq!(store.get_put_count(), 0);
        assert_eq!(std::fs::read(dir.path().join("doc.txt")).unwrap(), b"text");
    }

    #[tokio::test]
    async fn test_incomplete_credentials_disable_upload() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let config = UploadConfig::resolve(
            UploadOptions {
                secret_id: Some("id".to_string()),
                enable_upload: Some(true),
                ..Default::default()
            },
            |_| None,
        );
        let writer = build_writer(
            dir.path(),
            config,
            &store,
            Box::new(MockImageProcessor::new()),
        );

        assert!(writer.write("doc.txt", b"text").await.unwrap().is_none());
        assert_eq!(store.get_put_count(), 0);
        assert!(!writer.config().upload_enabled());
        assert_eq!(writer.config().key_prefix(), "mineru/");
    }

    #[tokio::test]
    async fn test_undecodable_image_uploads_original() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            dir.path(),
            test_config(true),
            &store,
            Box::new(ImageProcessor::new()),
        );

        let url = writer
            .write("images/broken.png", b"not really a png")
            .await
            .unwrap();

        assert!(url.is_some());
        let uploaded = store.get_object("mineru/images/broken.png").unwrap();
        assert_eq!(uploaded.body, b"not really a png");
        assert!(!dir.path().join("resize_images/broken.png").exists());
    }

    #[tokio::test]
    async fn test_non_image_skips_processing() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let image = MockImageProcessor::new();
        let image_probe = image.clone();
        let writer = build_writer(dir.path(), test_config(true), &store, Box::new(image));

        writer.write("notes/doc.json", b"{}").await.unwrap();

        assert_eq!(image_probe.get_process_count(), 0);
        assert_eq!(store.get_object("mineru/notes/doc.json").unwrap().body, b"{}");
    }

    #[tokio::test]
    async fn test_backslashes_normalized_in_key() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            dir.path(),
            test_config(true),
            &store,
            Box::new(MockImageProcessor::new()),
        );

        writer.write("tables\\t1.html", b"<table/>").await.unwrap();

        assert_eq!(store.get_keys(), vec!["mineru/tables/t1.html".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_failure_returns_none_and_keeps_local_file() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new().with_put_failure(true);
        let writer = build_writer(
            dir.path(),
            test_config(true),
            &store,
            Box::new(MockImageProcessor::new()),
        );

        let url = writer.write("doc.txt", b"text").await.unwrap();

        assert!(url.is_none());
        assert_eq!(store.get_put_count(), 1);
        assert_eq!(std::fs::read(dir.path().join("doc.txt")).unwrap(), b"text");
    }

    #[tokio::test]
    async fn test_local_write_failure_propagates() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            &blocker,
            test_config(true),
            &store,
            Box::new(MockImageProcessor::new()),
        );

        assert!(writer.write("a.txt", b"x").await.is_err());
        assert_eq!(store.get_put_count(), 0);
    }

    #[tokio::test]
    async fn test_resize_failure_uploads_original() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            dir.path(),
            test_config(true),
            &store,
            Box::new(MockImageProcessor::new().with_failure(true)),
        );

        writer.write("images/c.gif", b"gif bytes").await.unwrap();

        assert_eq!(
            store.get_object("mineru/images/c.gif").unwrap().body,
            b"gif bytes"
        );
    }

    #[tokio::test]
    async fn test_write_with_metadata_uploads_original_with_headers() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let image = MockImageProcessor::new();
        let image_probe = image.clone();
        let writer = build_writer(dir.path(), test_config(true), &store, Box::new(image));
        let metadata: HashMap<String, Value> = [
            ("page".to_string(), json!(3)),
            ("source".to_string(), json!("report.pdf")),
        ]
        .into_iter()
        .collect();

        let url = writer
            .write_with_metadata("images/sub/d.png", b"png", &metadata)
            .await
            .unwrap();

        assert!(url.unwrap().ends_with("/mineru/d.png"));
        let uploaded = store.get_object("mineru/d.png").unwrap();
        assert_eq!(uploaded.body, b"png");
        assert_eq!(uploaded.metadata.get("x-cos-meta-page").unwrap(), "3");
        assert_eq!(
            uploaded.metadata.get("x-cos-meta-source").unwrap(),
            "report.pdf"
        );
        assert_eq!(image_probe.get_process_count(), 0);
        assert!(dir.path().join("images/sub/d.png").exists());
    }

    #[tokio::test]
    async fn test_write_with_empty_metadata_skips_upload() {
        let dir = tempdir().unwrap();
        let store = MockCosClient::new();
        let writer = build_writer(
            dir.path(),
            test_config(true),
            &store,
            Box::new(MockImageProcessor::new()),
        );

        let url = writer
            .write_with_metadata("a.txt", b"x", &HashMap::new())
            .await
            .unwrap();

        assert!(url.is_none());
        assert_eq!(store.get_put_count(), 0);
        assert!(dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_cos_metadata_stringifies_values() {
        let metadata: HashMap<String, Value> = [
            ("flag".to_string(), json!(true)),
            ("tags".to_string(), json!(["a", "b"])),
        ]
        .into_iter()
        .collect();

        let headers = cos_metadata(&metadata);

        assert_eq!(headers.get("x-cos-meta-flag").unwrap(), "true");
        assert_eq!(headers.get("x-cos-meta-tags").unwrap(), r#"["a","b"]"#);
    }
}
