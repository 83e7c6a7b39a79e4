use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::Method;
use stratus_signer::presign::{PresignOptions, Presigned, presign};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::list::{Listing, list_objects};
use crate::multipart;
use crate::object::{DeleteObject, GetObject, Object, PutObject, PutOutcome};
use crate::settings::{
    AccessControlPolicy, GetBucketAcl, GetBucketLocation, GetBucketVersioning,
    SetBucketVersioning, VersioningStatus,
};
use crate::{Connection, Operation, S3Error, Target};

/// A session bound to one bucket.
///
/// A fresh session does not know its region; [`Bucket::init`] looks it up
/// and derives the first signing key. Every other method fails with
/// [`S3Error::Uninitialized`] until then. Clones share the signing key.
#[derive(Debug, Clone)]
pub struct Bucket {
    connection: Arc<Connection>,
    name: Arc<str>,
    target: Arc<Target>,
}

impl Bucket {
    pub(crate) fn new(connection: Arc<Connection>, name: &str) -> Self {
        let host = format!("{}.{}", name, connection.config().service_host);
        let target = Target::new(host, connection.key_cell());
        Self {
            connection,
            name: Arc::from(name),
            target: Arc::new(target),
        }
    }

    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Region the session signs for, once known.
    pub fn region(&self) -> Option<String> {
        self.target.keys().region()
    }

    /// Discover the bucket's region and derive the signing key.
    pub async fn init(&self, cancel: &CancellationToken) -> Result<String, S3Error> {
        let region = self
            .connection
            .perform(&GetBucketLocation::new(self.name()), &self.target, cancel)
            .await
            .map_err(S3Error::surface)?;
        self.target.keys().set_region(&region, &Utc::now());
        info!(bucket = %self.name, region = %region, "Opened bucket");
        Ok(region)
    }

    /// Every object whose key starts with `prefix`.
    pub async fn list(&self, prefix: &str, cancel: &CancellationToken) -> Result<Listing, S3Error> {
        self.ready()?;
        let result = match list_objects(&self.connection, &self.target, self.name(), prefix, cancel).await {
            Err(S3Error::AuthMalformed { region }) => {
                self.recover(S3Error::AuthMalformed { region }, cancel).await?;
                list_objects(&self.connection, &self.target, self.name(), prefix, cancel).await
            }
            result => result,
        };
        result.map_err(S3Error::surface)
    }

    /// The current version of `key`, verified against its integrity
    /// metadata.
    pub async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Object, S3Error> {
        self.run(&GetObject::new(self.name(), key), cancel).await
    }

    /// A specific version of `key`.
    pub async fn get_version(
        &self,
        key: &str,
        version_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Object, S3Error> {
        self.run(&GetObject::version(self.name(), key, version_id), cancel)
            .await
    }

    /// Store `body` as `key`.
    ///
    /// Bodies above the multipart threshold are uploaded in parts.
    pub async fn put(
        &self,
        key: &str,
        body: impl Into<Bytes>,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PutOutcome, S3Error> {
        self.ready()?;
        let body = body.into();
        let config = self.connection.config();

        if body.len() <= config.multipart_threshold {
            let mut operation = PutObject::new(self.name(), key, body);
            if let Some(content_type) = content_type {
                operation = operation.with_content_type(content_type);
            }
            return self.run(&operation, cancel).await;
        }

        if content_type.is_some() {
            warn!(key, "Content type is not applied to multipart uploads");
        }
        let upload = || {
            multipart::upload(
                &self.connection,
                &self.target,
                self.name(),
                key,
                body.clone(),
                config.part_size,
                cancel,
            )
        };
        let result = match upload().await {
            Err(S3Error::AuthMalformed { region }) => {
                self.recover(S3Error::AuthMalformed { region }, cancel).await?;
                upload().await
            }
            result => result,
        };
        result.map_err(S3Error::surface)
    }

    /// Delete `key`.
    pub async fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<(), S3Error> {
        self.run(&DeleteObject::new(self.name(), key), cancel).await
    }

    /// Versioning state of the bucket.
    pub async fn versioning(&self, cancel: &CancellationToken) -> Result<VersioningStatus, S3Error> {
        self.run(&GetBucketVersioning::new(self.name()), cancel).await
    }

    /// Whether versioning is currently enabled.
    pub async fn is_versioning_enabled(&self, cancel: &CancellationToken) -> Result<bool, S3Error> {
        Ok(self.versioning(cancel).await?.is_enabled())
    }

    /// Enable or suspend versioning.
    pub async fn set_versioning(&self, enabled: bool, cancel: &CancellationToken) -> Result<(), S3Error> {
        self.run(&SetBucketVersioning::new(self.name(), enabled), cancel)
            .await
    }

    /// Owner and grants of the bucket.
    pub async fn acl(&self, cancel: &CancellationToken) -> Result<AccessControlPolicy, S3Error> {
        self.run(&GetBucketAcl::new(self.name()), cancel).await
    }

    /// A URL that lets anyone `GET` `key` for `expires`.
    pub fn presign_get(&self, key: &str, expires: Duration) -> Result<Url, S3Error> {
        let region = self.region().ok_or(S3Error::Uninitialized)?;
        let config = self.connection.config();
        let Presigned { url, .. } = presign(
            self.connection.credentials(),
            &PresignOptions {
                method: Method::GET.to_string(),
                scheme: config.scheme.clone(),
                host: self.target.host().to_string(),
                path: format!("/{}", key),
                region,
                service: config.service.clone(),
                expires: expires.as_secs(),
                checksum: None,
                time: Utc::now(),
            },
        )?;
        Ok(url)
    }

    fn ready(&self) -> Result<(), S3Error> {
        match self.region() {
            Some(_) => Ok(()),
            None => Err(S3Error::Uninitialized),
        }
    }

    /// Run `operation` under the retry policy, recovering once from a
    /// request signed for the wrong region.
    async fn run<O: Operation>(
        &self,
        operation: &O,
        cancel: &CancellationToken,
    ) -> Result<O::Output, S3Error> {
        self.ready()?;
        let result = match self.connection.perform(operation, &self.target, cancel).await {
            Err(S3Error::AuthMalformed { region }) => {
                self.recover(S3Error::AuthMalformed { region }, cancel).await?;
                self.connection.perform(operation, &self.target, cancel).await
            }
            result => result,
        };
        result.map_err(S3Error::surface)
    }

    /// Handle an auth-malformed failure.
    ///
    /// With a region hint the session switches to that region and `Ok`
    /// tells the caller to run the operation again. Without one the bucket
    /// location is looked up only to tell a deleted bucket apart; the
    /// original error is returned in every other case.
    async fn recover(&self, original: S3Error, cancel: &CancellationToken) -> Result<(), S3Error> {
        if let S3Error::AuthMalformed {
            region: Some(region),
        } = &original
        {
            info!(bucket = %self.name, region = %region, "Store named a different region");
            self.target.keys().set_region(region, &Utc::now());
            return Ok(());
        }

        match self
            .connection
            .perform(&GetBucketLocation::new(self.name()), &self.target, cancel)
            .await
        {
            Err(S3Error::BucketNotFound) => Err(S3Error::BucketNotFound),
            Err(S3Error::Canceled) => Err(S3Error::Canceled),
            _ => Err(original),
        }
    }
}
