#![warn(missing_docs)]

//! Request signing for S3-compatible object stores.
//!
//! This crate is pure and deterministic: given the same inputs and the same
//! timestamp it always produces the same canonical strings and signatures.
//! It performs no I/O and keeps no state beyond the values handed to it.
//!
//! Two signing schemes are supported:
//!
//! - [`v4`] - the AWS Signature Version 4 header scheme, driven by a
//!   [`CanonicalRequest`] and a daily [`SigningKey`]
//! - [`v2`] - the legacy scheme that signs a short newline-joined string
//!   with the raw secret key
//!
//! Query-string authentication (presigned URLs) lives in [`presign`].
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use stratus_signer::{CanonicalRequest, Credentials, SigningKey, hash, v4};
//!
//! let credentials = Credentials::new("AKIDEXAMPLE", "secret");
//! let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let key = SigningKey::derive(credentials.secret_access_key(), "20240101", "us-east-1", "s3");
//!
//! let request = CanonicalRequest::new("GET", "/photos/cat.jpg")
//!     .with_header("host", "my-bucket.s3.amazonaws.com")
//!     .with_payload_hash(hash::EMPTY_PAYLOAD_SHA256);
//!
//! let signed = v4::sign(&credentials, &key, &request, &time, "us-east-1", "s3");
//! assert!(signed.authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240101/"));
//! ```

mod canonical;
pub use canonical::*;

mod credentials;
pub use credentials::*;

mod key;
pub use key::*;

mod region;
pub use region::*;

pub mod hash;
pub mod presign;
pub mod v2;
pub mod v4;

use thiserror::Error;

/// Errors produced while preparing a request for signing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The URL handed to the signer has no host component.
    #[error("URL has no host: {0}")]
    MissingHost(String),

    /// A URL could not be parsed or rebuilt.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The path has a `.` or `..` segment, which URL normalization would
    /// collapse into a different resource than the one signed.
    #[error("Path {0:?} has a dot segment and cannot be addressed")]
    DotSegment(String),
}
