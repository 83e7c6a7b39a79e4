//! AWS Signature Version 4, header flavour.
//!
//! The signer adds `x-amz-date` and `x-amz-content-sha256` to the canonical
//! request, hashes it, and signs the resulting string with a daily
//! [`SigningKey`]. The caller sends every header of the returned
//! [`SignedRequest`] along with the request.

use chrono::{DateTime, Utc};

use crate::hash::{hex_encode, sha256};
use crate::{CanonicalRequest, Credentials, KEY_TYPE_IDENTIFIER, SigningKey};

/// Algorithm identifier used in the string to sign and `Authorization` header.
pub const ALGORITHM_IDENTIFIER: &str = "AWS4-HMAC-SHA256";

/// Header carrying the request timestamp.
pub const AMZ_DATE_HEADER: &str = "x-amz-date";

/// Header carrying the body hash.
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// Result of signing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Value of the `Authorization` header
    pub authorization: String,
    /// `YYYYMMDDTHHMMSSZ` timestamp that was signed
    pub timestamp: String,
    /// The canonical request that was hashed
    pub canonical_request: String,
    /// The string that was signed
    pub string_to_sign: String,
    /// Hex signature
    pub signature: String,
}

impl SignedRequest {
    /// Headers to attach to the outgoing request, besides `host`.
    pub fn headers(&self, payload_hash: &str) -> Vec<(String, String)> {
        vec![
            (AMZ_DATE_HEADER.to_string(), self.timestamp.clone()),
            (CONTENT_SHA256_HEADER.to_string(), payload_hash.to_string()),
            ("authorization".to_string(), self.authorization.clone()),
        ]
    }
}

/// Format a time the way SigV4 expects it.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Format the `YYYYMMDD` date a signing key is derived for.
pub fn format_date(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%d").to_string()
}

/// Credential scope: `date/region/service/aws4_request`.
pub fn scope(date: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/{}", date, region, service, KEY_TYPE_IDENTIFIER)
}

/// Build the string to sign from its parts.
pub fn string_to_sign(timestamp: &str, scope: &str, canonical_request_hash: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM_IDENTIFIER, timestamp, scope, canonical_request_hash
    )
}

/// Sign `request` at `time`.
///
/// `key` must have been derived for the UTC date of `time` and for `region`;
/// the bucket session is responsible for rotating it.
pub fn sign(
    credentials: &Credentials,
    key: &SigningKey,
    request: &CanonicalRequest,
    time: &DateTime<Utc>,
    region: &str,
    service: &str,
) -> SignedRequest {
    let timestamp = format_timestamp(time);
    let scope = scope(&format_date(time), region, service);

    let request = request
        .clone()
        .with_header(AMZ_DATE_HEADER, &timestamp)
        .with_header(CONTENT_SHA256_HEADER, request.payload_hash());

    let canonical_request = request.canonical_string();
    let string_to_sign = string_to_sign(
        &timestamp,
        &scope,
        &hex_encode(&sha256(canonical_request.as_bytes())),
    );
    let signature = key.sign(string_to_sign.as_bytes()).to_string();

    let authorization = format!(
        "{} Credential={}/{},SignedHeaders={},Signature={}",
        ALGORITHM_IDENTIFIER,
        credentials.access_key_id(),
        scope,
        request.signed_headers(),
        signature
    );

    SignedRequest {
        authorization,
        timestamp,
        canonical_request,
        string_to_sign,
        signature,
    }
}
