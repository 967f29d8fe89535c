//! Foundation types for cstore.
//!
//! Every piece of binary content held by a cstore backend is named by a
//! [`ContentUrl`]. URLs are generated here, validated here, and are otherwise
//! treated as opaque strings by every other crate.
//!
//! # Key Types
//!
//! - [`ContentUrl`] — time-partitioned, globally unique content identifier
//! - [`UrlTimeRange`] — half-open creation-time window used for enumeration
//! - [`UrlError`] — rejection reasons from the URL validator
//!
//! # URL Format
//!
//! ```text
//! store://<year>/<month>/<day>/<hour>/<minute>/<uuid>.bin
//! ```
//!
//! Date components are not zero-padded. The legacy `file://` scheme is still
//! accepted by the validator.

pub mod error;
pub mod temporal;
pub mod url;

pub use error::UrlError;
pub use temporal::{Timestamp, UrlTimeRange};
pub use url::{
    relative_part, ContentUrl, BIN_SUFFIX, LEGACY_FILE_PROTOCOL, MIN_RELATIVE_LEN, PROTOCOLS,
    STORE_PROTOCOL,
};
