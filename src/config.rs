//! Upload configuration
//!
//! Resolves explicit writer options against a fallback lookup (the process
//! environment in production) into an immutable [`UploadConfig`], and parses
//! the JSON configuration file shared with the `check_cos_config` tool.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_REGION: &str = "ap-guangzhou";
pub const DEFAULT_PREFIX: &str = "mineru/";

pub const ENV_SECRET_ID: &str = "COS_SECRET_ID";
pub const ENV_SECRET_KEY: &str = "COS_SECRET_KEY";
pub const ENV_BUCKET: &str = "COS_BUCKET";

/// Mask a secret for display: `first6***last4` when longer than 10 chars.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    } else {
        "***".to_string()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &mask_secret(&self.secret_id))
            .field("secret_key", &"***")
            .finish()
    }
}

/// The `cos` section of `config/cos_config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CosSection {
    #[serde(default)]
    pub secret_id: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub enable_upload: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CosConfigFile {
    #[serde(default)]
    pub cos: CosSection,
}

impl CosConfigFile {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Explicit writer arguments. Unset fields fall back to defaults or the
/// environment during [`UploadConfig::resolve`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub enable_upload: Option<bool>,
}

impl UploadOptions {
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        Ok(CosConfigFile::load(path)?.cos.into())
    }
}

impl From<CosSection> for UploadOptions {
    fn from(section: CosSection) -> Self {
        Self {
            secret_id: section.secret_id,
            secret_key: section.secret_key,
            region: section.region,
            bucket: section.bucket,
            prefix: section.prefix,
            enable_upload: section.enable_upload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    credentials: Option<Credentials>,
    region: String,
    bucket: String,
    key_prefix: String,
    upload_enabled: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// S3-compatible service endpoint for a COS region.
pub fn cos_endpoint(region: &str) -> String {
    format!("https://cos.{}.myqcloud.com", region)
}

/// Collapse trailing slashes into exactly one.
pub fn normalize_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

impl UploadConfig {
    /// Merge explicit options with `lookup`, which supplies the fallback
    /// credential id, secret and bucket by environment variable name.
    pub fn resolve<F>(options: UploadOptions, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_id = non_empty(options.secret_id).or_else(|| non_empty(lookup(ENV_SECRET_ID)));
        let secret_key =
            non_empty(options.secret_key).or_else(|| non_empty(lookup(ENV_SECRET_KEY)));
        let bucket = non_empty(options.bucket).or_else(|| non_empty(lookup(ENV_BUCKET)));

        let region = non_empty(options.region).unwrap_or_else(|| DEFAULT_REGION.to_string());
        let key_prefix = normalize_prefix(options.prefix.as_deref().unwrap_or(DEFAULT_PREFIX));
        let requested = options.enable_upload.unwrap_or(true);

        let credentials = match (secret_id, secret_key) {
            (Some(secret_id), Some(secret_key)) => Some(Credentials {
                secret_id,
                secret_key,
            }),
            _ => None,
        };

        let complete = credentials.is_some() && bucket.is_some();
        if requested && !complete {
            warn!("COS credentials not complete, upload disabled");
        }

        Self {
            credentials,
            region,
            bucket: bucket.unwrap_or_default(),
            key_prefix,
            upload_enabled: requested && complete,
        }
    }

    /// Resolve against the process environment, loading `.env` first if present.
    pub fn from_env(options: UploadOptions) -> Self {
        dotenvy::dotenv().ok();
        Self::resolve(options, |name| std::env::var(name).ok())
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn upload_enabled(&self) -> bool {
        self.upload_enabled
    }

    pub fn object_url(&self, key: &str) -> String {
        format!(
            "https://{}.cos.{}.myqcloud.com/{}",
            self.bucket, self.region, key
        )
    }
}
