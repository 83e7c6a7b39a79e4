//! One exchange with the store, classified.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::xml::ErrorBody;
use crate::{HttpRequest, HttpResponse, S3Error, Transport};

/// Sends signed requests over a [`Transport`] and maps every outcome onto
/// [`S3Error`].
#[derive(Debug, Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
}

impl Executor {
    /// Create an executor over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Perform one exchange.
    ///
    /// A token that is already canceled short-circuits without touching the
    /// network; a cancel while the exchange is in flight drops it.
    pub async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, S3Error> {
        if cancel.is_cancelled() {
            return Err(S3Error::Canceled);
        }

        debug!(method = %request.method, url = %request.url, "Sending request");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(S3Error::Canceled),
            response = self.transport.send(request) => response?,
        };

        debug!(status = response.status, "Received response");
        classify(response)
    }
}

/// Map a response onto success or a named failure.
pub fn classify(response: HttpResponse) -> Result<HttpResponse, S3Error> {
    if response.is_success() {
        return Ok(response);
    }

    let error = ErrorBody::parse(&response.body);
    Err(match response.status {
        301 => S3Error::PermanentRedirect {
            endpoint: error.endpoint,
        },
        307 => S3Error::TemporaryRedirect {
            endpoint: error.endpoint,
        },
        400 => match error.code.as_str() {
            "RequestTimeout" => S3Error::Timeout,
            "AuthorizationHeaderMalformed" => S3Error::AuthMalformed {
                region: Some(error.region).filter(|region| !region.is_empty()),
            },
            _ => S3Error::BadRequest { code: error.code },
        },
        403 => match error.code.as_str() {
            "SignatureDoesNotMatch" => {
                warn!(message = %error.message, "Store rejected the request signature");
                S3Error::SignatureMismatch
            }
            "InvalidAccessKeyId" => S3Error::InvalidKey,
            _ => S3Error::AccessDenied,
        },
        404 => match error.code.as_str() {
            "NoSuchBucket" => S3Error::BucketNotFound,
            _ => S3Error::ObjectNotFound,
        },
        500 => match error.code.as_str() {
            "InternalError" => S3Error::InternalError,
            _ => S3Error::ServerError(500),
        },
        503 => S3Error::ServiceUnavailable,
        status @ 501..=599 => S3Error::ServerError(status),
        status => S3Error::UnknownError {
            status,
            code: error.code,
        },
    })
}

/// Classify an `<Error>` document that arrived with a success status.
///
/// Long-running requests such as completing a multipart upload report late
/// failures this way.
pub fn classify_embedded(body: &[u8]) -> S3Error {
    let error = ErrorBody::parse(body);
    match error.code.as_str() {
        "InternalError" => S3Error::InternalError,
        "ServiceUnavailable" | "SlowDown" => S3Error::ServiceUnavailable,
        "RequestTimeout" => S3Error::Timeout,
        "AccessDenied" => S3Error::AccessDenied,
        "NoSuchUpload" | "NoSuchKey" => S3Error::ObjectNotFound,
        "NoSuchBucket" => S3Error::BucketNotFound,
        _ => S3Error::UnknownError {
            status: 200,
            code: error.code,
        },
    }
}
