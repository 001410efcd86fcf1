//! Data writer that mirrors local files to Tencent COS
//!
//! Every write lands on local disk first. Raster images additionally get a
//! half-resolution derivative, and when upload is configured one of the two
//! payloads is pushed to a COS bucket. A companion checker validates the JSON
//! configuration file and probes the bucket.

pub mod check;
pub mod config;
pub mod cos;
pub mod error;
pub mod image;
pub mod local;
pub mod writer;

pub use error::{Error, Result};
