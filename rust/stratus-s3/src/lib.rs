#![warn(missing_docs)]

//! A client for S3-compatible object stores that keeps working when the
//! network does not.
//!
//! Every call goes through the same pipeline: an [`Operation`] builds an
//! unsigned [`S3Request`], the [`Connection`] signs it for the current hop,
//! the [`Executor`] sends it over a [`Transport`] and classifies the outcome
//! into an [`S3Error`], temporary redirects are followed, and the whole
//! exchange is retried with a growing backoff while the failure is
//! transient. Objects above the multipart threshold are uploaded in parts,
//! and a failed multipart upload is always aborted.
//!
//! ```no_run
//! use stratus_s3::{Client, Config, Credentials};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), stratus_s3::S3Error> {
//! let client = Client::new(Credentials::new("AKID", "secret"), Config::default())?;
//! let cancel = CancellationToken::new();
//!
//! let bucket = client.open("photos", &cancel).await?;
//! bucket.put("cat.jpg", &b"meow"[..], Some("image/jpeg"), &cancel).await?;
//! let object = bucket.get("cat.jpg", &cancel).await?;
//! assert_eq!(&object.body[..], b"meow");
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod config;
pub use config::*;

mod transport;
pub use transport::*;

mod executor;
pub use executor::*;

mod signing;
pub use signing::*;

mod request;
pub use request::*;

mod connection;
pub use connection::*;

mod session;
pub use session::*;

mod client;
pub use client::*;

pub mod xml;

pub mod retry;

/// Following temporary redirects across hosts.
pub mod redirect;

pub mod object;
pub use object::{Object, PutOutcome};

pub mod list;
pub use list::{BucketSummary, Listing, ObjectSummary};

pub mod settings;
pub use settings::{AccessControlPolicy, Grant, VersioningStatus};

pub mod multipart;

#[cfg(any(test, feature = "helpers"))]
pub mod helpers;

pub use stratus_signer::Credentials;
