//! COS configuration checks
//!
//! Validates `config/cos_config.json` without ever failing: problems end up
//! in a [`ConfigReport`]. A passing configuration can then be probed against
//! the live bucket.

use crate::config::{mask_secret, CosConfigFile, CosSection, DEFAULT_PREFIX};
use crate::cos::ObjectStore;
use crate::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/cos_config.json";
pub const EXAMPLE_CONFIG_PATH: &str = "config/cos_config.example.json";

pub const REQUIRED_FIELDS: [&str; 4] = ["secret_id", "secret_key", "bucket", "region"];
const SENSITIVE_FIELDS: [&str; 2] = ["secret_id", "secret_key"];
const PLACEHOLDER_PREFIX: &str = "your-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Bucket name is not `<name>-<appid>`.
    BucketFormat(String),
    UploadDisabled,
}

#[derive(Debug, Default)]
pub struct ConfigReport {
    config_path: PathBuf,
    load_error: Option<String>,
    checked: Vec<(&'static str, String)>,
    missing: Vec<&'static str>,
    warnings: Vec<ConfigWarning>,
    section: Option<CosSection>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.load_error.is_none() && self.missing.is_empty() && self.section.is_some()
    }

    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Present required fields with sensitive values masked.
    pub fn checked(&self) -> &[(&'static str, String)] {
        &self.checked
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// The parsed section, only when validation passed.
    pub fn section(&self) -> Option<&CosSection> {
        if self.is_ok() {
            self.section.as_ref()
        } else {
            None
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn print(&self) {
        print!("{}", self);
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.config_path.display();

        if let Some(error) = &self.load_error {
            writeln!(f, "{}", error)?;
            if !self.config_path.exists() {
                writeln!(f, "\nCreate it from {}", EXAMPLE_CONFIG_PATH)?;
            }
            return Ok(());
        }

        writeln!(f, "Checking COS configuration: {}", path)?;
        writeln!(f, "{}", "-".repeat(50))?;
        for (field, display) in &self.checked {
            writeln!(f, "  ok  {}: {}", field, display)?;
        }

        if !self.missing.is_empty() {
            writeln!(f, "\nMissing configuration: {}", self.missing.join(", "))?;
            return writeln!(f, "Edit {} and fill in real values", path);
        }

        for warning in &self.warnings {
            match warning {
                ConfigWarning::BucketFormat(bucket) => {
                    writeln!(f, "\nWarning: bucket name may be malformed: {}", bucket)?;
                    writeln!(f, "  expected format: bucketname-appid")?;
                    writeln!(f, "  for example:     myimages-1250000000")?;
                }
                ConfigWarning::UploadDisabled => {
                    writeln!(f, "\nWarning: COS upload is not enabled")?;
                    writeln!(f, "  set \"enable_upload\": true")?;
                }
            }
        }

        if let Some(section) = &self.section {
            writeln!(f, "\nCurrent configuration:")?;
            writeln!(f, "  Region: {}", section.region.as_deref().unwrap_or(""))?;
            writeln!(
                f,
                "  Prefix: {}",
                section.prefix.as_deref().unwrap_or(DEFAULT_PREFIX)
            )?;
            writeln!(f, "  Enable: {}", section.enable_upload.unwrap_or(false))?;
        }

        Ok(())
    }
}

fn field_value<'a>(section: &'a CosSection, field: &str) -> Option<&'a str> {
    match field {
        "secret_id" => section.secret_id.as_deref(),
        "secret_key" => section.secret_key.as_deref(),
        "bucket" => section.bucket.as_deref(),
        "region" => section.region.as_deref(),
        _ => None,
    }
}

/// Absent, empty, or still holding a `your-...` placeholder.
pub fn is_unset(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.is_empty() || v.starts_with(PLACEHOLDER_PREFIX),
    }
}

/// Heuristic for COS bucket names, which end in `-<numeric appid>`.
pub fn bucket_name_looks_valid(bucket: &str) -> bool {
    match bucket.rsplit_once('-') {
        Some((_, appid)) => !appid.is_empty() && appid.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Validate the configuration file at `path`.
pub fn validate(path: &Path) -> ConfigReport {
    let mut report = ConfigReport {
        config_path: path.to_path_buf(),
        ..Default::default()
    };

    if !path.exists() {
        report.load_error = Some(format!(
            "Configuration file does not exist: {}",
            path.display()
        ));
        return report;
    }

    let file = match CosConfigFile::load(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Failed to load {}: {}", path.display(), e);
            report.load_error = Some(format!(
                "Configuration file could not be read: {}: {}",
                path.display(),
                e
            ));
            return report;
        }
    };

    validate_section(&mut report, file.cos);
    report
}

fn validate_section(report: &mut ConfigReport, section: CosSection) {
    for field in REQUIRED_FIELDS {
        let value = field_value(&section, field);
        if is_unset(value) {
            report.missing.push(field);
            continue;
        }

        let value = value.unwrap_or_default();
        let display = if SENSITIVE_FIELDS.contains(&field) {
            mask_secret(value)
        } else {
            value.to_string()
        };
        report.checked.push((field, display));
    }

    if report.missing.is_empty() {
        if let Some(bucket) = section.bucket.as_deref() {
            if !bucket_name_looks_valid(bucket) {
                report
                    .warnings
                    .push(ConfigWarning::BucketFormat(bucket.to_string()));
            }
        }
        if !section.enable_upload.unwrap_or(false) {
            report.warnings.push(ConfigWarning::UploadDisabled);
        }
    }

    debug!(
        missing = report.missing.len(),
        warnings = report.warnings.len(),
        "COS configuration validated"
    );
    report.section = Some(section);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Connected,
    BucketNotFound(String),
    AccessDenied,
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ProbeOutcome::Connected)
    }

    pub fn render(&self) -> String {
        match self {
            ProbeOutcome::Connected => "Connected to the COS bucket".to_string(),
            ProbeOutcome::BucketNotFound(bucket) => format!(
                "Bucket does not exist: {}\n\n\
                 Possible causes:\n\
                 1. The bucket name is wrong (it must include the APPID)\n\
                 2. The bucket is not in the configured region\n\
                 3. The bucket has not been created",
                bucket
            ),
            ProbeOutcome::AccessDenied => {
                "Access denied, check secret_id and secret_key".to_string()
            }
            ProbeOutcome::Failed(message) => format!("Connection failed: {}", message),
        }
    }
}

/// Ask `store` whether its bucket exists and classify the answer.
pub async fn probe(store: &dyn ObjectStore) -> ProbeOutcome {
    match store.head_bucket().await {
        Ok(()) => ProbeOutcome::Connected,
        Err(Error::BucketNotFound(bucket)) => ProbeOutcome::BucketNotFound(bucket),
        Err(Error::AccessDenied(_)) => ProbeOutcome::AccessDenied,
        Err(e) => ProbeOutcome::Failed(e.to_string()),
    }
}

/// Build a COS client from a validated section and probe its bucket.
#[cfg(feature = "cos")]
pub async fn probe_cos(section: &CosSection) -> ProbeOutcome {
    let (Some(secret_id), Some(secret_key), Some(region), Some(bucket)) = (
        section.secret_id.clone(),
        section.secret_key.clone(),
        section.region.clone(),
        section.bucket.clone(),
    ) else {
        return ProbeOutcome::Failed("configuration is incomplete".to_string());
    };

    match crate::cos::CosClient::new(secret_id, secret_key, region, bucket).await {
        Ok(client) => probe(&client).await,
        Err(e) => ProbeOutcome::Failed(e.to_string()),
    }
}
