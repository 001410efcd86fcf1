use anyhow::{Context, Result};
use clap::Parser;
use cos_writer::config::{UploadConfig, UploadOptions};
use cos_writer::writer::CosDataWriter;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cos-writer")]
#[command(about = "Save a file locally and mirror it to Tencent COS")]
struct CliArgs {
    /// File whose contents should be written.
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Destination path passed to the writer (defaults to SOURCE's file name).
    #[arg(long)]
    dest: Option<String>,

    /// Directory that relative destinations are written under.
    #[arg(long)]
    parent_dir: Option<PathBuf>,

    /// JSON config file with a `cos` section; environment variables fill gaps.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Object metadata as KEY=VALUE; uploads the original bytes with metadata.
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta_arg)]
    metadata: Vec<(String, String)>,
}

fn parse_meta_arg(input: &str) -> std::result::Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid metadata '{}'. Expected format: KEY=VALUE", input)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cos_writer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let options = match &args.config {
        Some(path) => UploadOptions::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => UploadOptions::default(),
    };
    let config = UploadConfig::from_env(options);

    let data = tokio::fs::read(&args.source)
        .await
        .with_context(|| format!("Failed to read {}", args.source.display()))?;
    let dest = match args.dest {
        Some(dest) => dest,
        None => args
            .source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("SOURCE has no file name; pass --dest")?,
    };

    let writer = CosDataWriter::new(args.parent_dir.unwrap_or_default(), config).await;
    if writer.upload_enabled() {
        info!(
            "Writing {} ({} bytes), uploading to {} under {}",
            dest,
            data.len(),
            writer.config().bucket(),
            writer.config().key_prefix()
        );
    } else {
        info!("Writing {} ({} bytes), upload disabled", dest, data.len());
    }

    let result = if args.metadata.is_empty() {
        writer.write(&dest, &data).await
    } else {
        let metadata: HashMap<String, Value> = args
            .metadata
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        writer.write_with_metadata(&dest, &data, &metadata).await
    };

    match result {
        Ok(Some(url)) => {
            println!("{}", url);
            Ok(())
        }
        Ok(None) => {
            println!("not uploaded");
            Ok(())
        }
        Err(e) => {
            error!("Failed to write {}: {}", dest, e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_meta_arg, CliArgs};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_cli_defaults_with_only_source() {
        let args = CliArgs::try_parse_from(["cos-writer", "file.txt"]).unwrap();

        assert_eq!(args.source, PathBuf::from("file.txt"));
        assert!(args.parent_dir.is_none());
        assert!(args.dest.is_none());
        assert!(args.config.is_none());
        assert!(args.metadata.is_empty());
    }

    #[test]
    fn test_cli_all_options() {
        let args = CliArgs::try_parse_from([
            "cos-writer",
            "fig.png",
            "--dest",
            "images/fig.png",
            "--parent-dir",
            "out",
            "--config",
            "config/cos_config.json",
            "--meta",
            "page=2",
            "--meta",
            "kind=figure",
        ])
        .unwrap();

        assert_eq!(args.dest.as_deref(), Some("images/fig.png"));
        assert_eq!(args.parent_dir, Some(PathBuf::from("out")));
        assert_eq!(args.config, Some(PathBuf::from("config/cos_config.json")));
        assert_eq!(
            args.metadata,
            vec![
                ("page".to_string(), "2".to_string()),
                ("kind".to_string(), "figure".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_rejects_malformed_meta() {
        assert!(CliArgs::try_parse_from(["cos-writer", "f.txt", "--meta", "oops"]).is_err());
    }

    #[test]
    fn test_parse_meta_arg_valid() {
        let parsed = parse_meta_arg("page=3").unwrap();
        assert_eq!(parsed, ("page".to_string(), "3".to_string()));
    }

    #[test]
    fn test_parse_meta_arg_keeps_equals_in_value() {
        let parsed = parse_meta_arg("query=a=b").unwrap();
        assert_eq!(parsed.1, "a=b");
    }

    #[test]
    fn test_parse_meta_arg_invalid() {
        assert!(parse_meta_arg("novalue").unwrap_err().contains("KEY=VALUE"));
        assert!(parse_meta_arg("=value").is_err());
    }
}
