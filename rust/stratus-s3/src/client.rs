use std::sync::Arc;

use chrono::Utc;
use stratus_signer::{Credentials, DEFAULT_REGION};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::list::{BucketSummary, ListBuckets};
use crate::retry::RetryObserver;
use crate::settings::CreateBucket;
use crate::{Bucket, Config, Connection, ReqwestTransport, S3Error, Target, Transport};

/// Account-level entry point.
///
/// Holds the credentials, configuration and transport that every [`Bucket`]
/// opened from it shares.
#[derive(Debug, Clone)]
pub struct Client {
    connection: Arc<Connection>,
}

impl Client {
    /// A client talking to the store over HTTPS.
    pub fn new(credentials: Credentials, config: Config) -> Result<Self, S3Error> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::assemble(credentials, config, Arc::new(transport)))
    }

    /// A client over a custom transport.
    pub fn with_transport(
        credentials: Credentials,
        config: Config,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, S3Error> {
        config.validate()?;
        Ok(Self::assemble(credentials, config, transport))
    }

    fn assemble(credentials: Credentials, config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            connection: Arc::new(Connection::new(credentials, config, transport)),
        }
    }

    /// Report retries to `observer` instead of the log.
    ///
    /// Buckets opened before this call keep their observer.
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        Arc::make_mut(&mut self.connection).set_observer(observer);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        self.connection.config()
    }

    /// An uninitialized session for `name`.
    pub fn bucket(&self, name: &str) -> Bucket {
        Bucket::new(self.connection.clone(), name)
    }

    /// A session for `name` with its region already discovered.
    pub async fn open(&self, name: &str, cancel: &CancellationToken) -> Result<Bucket, S3Error> {
        let bucket = self.bucket(name);
        bucket.init(cancel).await?;
        Ok(bucket)
    }

    /// Every bucket the account owns.
    pub async fn list_buckets(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<BucketSummary>, S3Error> {
        let keys = self.connection.key_cell();
        keys.set_region(DEFAULT_REGION, &Utc::now());
        let target = Target::new(&self.config().service_host, keys);
        self.connection
            .perform(&ListBuckets, &target, cancel)
            .await
            .map_err(S3Error::surface)
    }

    /// Create `name` in `region` and return an initialized session for it.
    pub async fn create_bucket(
        &self,
        name: &str,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<Bucket, S3Error> {
        let bucket = self.bucket(name);
        let target = Target::new(
            format!("{}.{}", name, self.config().service_host),
            self.connection.key_cell(),
        );
        self.connection
            .perform(&CreateBucket::new(name, region), &target, cancel)
            .await
            .map_err(S3Error::surface)?;
        info!(bucket = name, region, "Created bucket");

        bucket.init(cancel).await?;
        Ok(bucket)
    }
}
