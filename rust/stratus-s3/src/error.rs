use stratus_signer::SigningError;
use thiserror::Error;
use tracing::warn;

use crate::TransportError;

/// Every outcome of an exchange with the store other than success.
///
/// This is the single vocabulary shared by the executor, the retry engine,
/// the redirect resolver and the bucket session. Variants only carry
/// structured data so callers can match on them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum S3Error {
    /// The caller canceled the operation
    #[error("Operation was canceled")]
    Canceled,

    /// The request was signed for the wrong region
    #[error("Authorization header is malformed (expected region: {region:?})")]
    AuthMalformed {
        /// Region the store says the bucket lives in, when it says so
        region: Option<String>,
    },

    /// The access key id is unknown to the store
    #[error("Access key id is not valid")]
    InvalidKey,

    /// The store computed a different signature
    #[error("Request signature does not match")]
    SignatureMismatch,

    /// The bucket must be addressed through another endpoint
    #[error("Permanent redirect to {endpoint:?}")]
    PermanentRedirect {
        /// Endpoint reported by the store
        endpoint: String,
    },

    /// The request should be re-issued against another endpoint
    #[error("Temporary redirect to {endpoint:?}")]
    TemporaryRedirect {
        /// Endpoint reported by the store
        endpoint: String,
    },

    /// The store rejected the request as malformed
    #[error("Bad request: {code}")]
    BadRequest {
        /// Error code from the response body, possibly empty
        code: String,
    },

    /// Access to the resource was denied
    #[error("Access denied")]
    AccessDenied,

    /// The object does not exist
    #[error("Object not found")]
    ObjectNotFound,

    /// The bucket does not exist
    #[error("Bucket not found")]
    BucketNotFound,

    /// The store reported its own internal error
    #[error("Store reported an internal error")]
    InternalError,

    /// The store is temporarily unavailable
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// A 5xx status without a recognized error code
    #[error("Server error (status {0})")]
    ServerError(u16),

    /// The downloaded body does not hash to the stored digest
    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Digest stored with the object
        expected: String,
        /// Digest of the bytes received
        actual: String,
    },

    /// DNS resolution failed
    #[error("Host not found")]
    HostNotFound,

    /// The connection dropped mid-exchange
    #[error("Connection lost")]
    ConnectionLost,

    /// No connection could be established
    #[error("No network connection")]
    NoConnection,

    /// The exchange timed out
    #[error("Request timed out")]
    Timeout,

    /// A status the client does not recognize
    #[error("Unknown error (status {status}, code {code:?})")]
    UnknownError {
        /// HTTP status
        status: u16,
        /// Error code from the response body, possibly empty
        code: String,
    },

    /// The redirect hop limit was exceeded
    #[error("Too many redirects ({hops} hops)")]
    TooManyRedirects {
        /// Hops taken when the limit tripped
        hops: u32,
    },

    /// A redirect pointed nowhere useful
    #[error("Invalid redirect to {endpoint:?}")]
    InvalidRedirect {
        /// Endpoint reported by the store
        endpoint: String,
    },

    /// A request could not be built from the given inputs
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A successful response carried a body that could not be understood
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The bucket session has not discovered its region yet
    #[error("Bucket session is not initialized")]
    Uninitialized,
}

impl S3Error {
    /// Whether the error is expected to go away on its own.
    ///
    /// Access denial is not in this set; the retry engine grants it one
    /// extra attempt separately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            S3Error::Timeout
                | S3Error::ConnectionLost
                | S3Error::ChecksumMismatch { .. }
                | S3Error::InternalError
                | S3Error::ServiceUnavailable
                | S3Error::ServerError(_)
                | S3Error::HostNotFound
        )
    }

    /// Whether the error is a permission failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, S3Error::AccessDenied | S3Error::SignatureMismatch)
    }

    /// Narrow the error to what callers of the bucket session see.
    ///
    /// A signature mismatch is reported as access denied.
    pub fn surface(self) -> Self {
        match self {
            S3Error::SignatureMismatch => S3Error::AccessDenied,
            other => other,
        }
    }
}

impl From<SigningError> for S3Error {
    fn from(error: SigningError) -> Self {
        S3Error::Configuration(error.to_string())
    }
}

impl From<TransportError> for S3Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::HostNotFound(_) => S3Error::HostNotFound,
            TransportError::ConnectionLost(_) => S3Error::ConnectionLost,
            TransportError::NoConnection(_) => S3Error::NoConnection,
            TransportError::Timeout => S3Error::Timeout,
            TransportError::Canceled => S3Error::Canceled,
            TransportError::Other(message) => {
                warn!(message = %message, "Unclassified transport failure");
                S3Error::UnknownError {
                    status: 0,
                    code: String::new(),
                }
            }
        }
    }
}
