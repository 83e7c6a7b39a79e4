use std::sync::Arc;

use chrono::Utc;
use stratus_signer::Credentials;
use tokio_util::sync::CancellationToken;

use crate::redirect;
use crate::retry::{Retry, RetryObserver, RetryPolicy, TracingObserver};
use crate::{
    Config, Executor, HttpResponse, KeyCell, S3Error, S3Request, SignatureVersion, Signing,
    Transport,
};

/// One request/response exchange with an operation-specific response shape.
pub trait Operation: Send + Sync {
    /// Parsed result of a successful exchange.
    type Output;

    /// Build the unsigned request.
    fn request(&self) -> Result<S3Request, S3Error>;

    /// Interpret a successful response.
    ///
    /// Errors returned here go through the same retry policy as transport
    /// failures, so a checksum mismatch is retried like any other transient
    /// failure.
    fn parse(&self, response: HttpResponse) -> Result<Self::Output, S3Error>;
}

/// Where requests go and which key signs them.
#[derive(Debug)]
pub struct Target {
    host: String,
    keys: KeyCell,
}

impl Target {
    /// A target at `host`, signing with `keys`.
    pub fn new(host: impl Into<String>, keys: KeyCell) -> Self {
        Self {
            host: host.into(),
            keys,
        }
    }

    /// Host requests are sent to before any redirect.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Signing key cell.
    pub fn keys(&self) -> &KeyCell {
        &self.keys
    }
}

/// Shared machinery behind a client and its buckets: transport, credentials,
/// configuration and retry policy.
#[derive(Debug, Clone)]
pub struct Connection {
    executor: Executor,
    credentials: Credentials,
    config: Config,
    policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
}

impl Connection {
    /// Assemble a connection. `config` must already be validated.
    pub fn new(credentials: Credentials, config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            executor: Executor::new(transport),
            policy: RetryPolicy::from_config(&config),
            credentials,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the retry observer.
    pub fn set_observer(&mut self, observer: Arc<dyn RetryObserver>) {
        self.observer = observer;
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Credentials in use.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// A fresh key cell for a new target.
    pub fn key_cell(&self) -> KeyCell {
        KeyCell::new(self.credentials.clone(), self.config.service.clone())
    }

    /// Send `request` once, following temporary redirects.
    pub async fn exchange(
        &self,
        request: &S3Request,
        target: &Target,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, S3Error> {
        redirect::follow(&target.host, self.config.max_redirects, |host| async move {
            let now = Utc::now();
            let signing = match request.version() {
                SignatureVersion::V2 => Signing::Legacy,
                SignatureVersion::V4 => target.keys.signing(&now)?,
            };
            let http = request.authorize(
                &self.config.scheme,
                &host,
                &self.config.service,
                &signing,
                &self.credentials,
                &now,
            )?;
            self.executor.execute(http, cancel).await
        })
        .await
    }

    /// Run `operation` once: one exchange (redirects included) and parsing.
    pub async fn attempt<O: Operation>(
        &self,
        operation: &O,
        target: &Target,
        cancel: &CancellationToken,
    ) -> Result<O::Output, S3Error> {
        let request = operation.request()?;
        let response = self.exchange(&request, target, cancel).await?;
        operation.parse(response)
    }

    /// Run `operation` under the retry policy.
    pub async fn perform<O: Operation>(
        &self,
        operation: &O,
        target: &Target,
        cancel: &CancellationToken,
    ) -> Result<O::Output, S3Error> {
        self.retry()
            .run(cancel, |_| self.attempt(operation, target, cancel))
            .await
    }

    /// A retry driver using this connection's policy and observer.
    pub fn retry(&self) -> Retry<'_> {
        Retry::new(&self.policy, self.observer.as_ref())
    }
}
