//! Single-request object operations.

use bytes::Bytes;
use reqwest::Method;
use stratus_signer::hash::sha256_hex;

use crate::{HttpResponse, Operation, S3Error, S3Request};

/// User metadata header carrying the lower-case hex SHA-256 of the object.
pub const CONTENT_SHA256_META: &str = "x-amz-meta-sha256";

/// A downloaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Object bytes
    pub body: Bytes,
    /// `ETag` header
    pub etag: Option<String>,
    /// `x-amz-version-id` header
    pub version_id: Option<String>,
    /// `Content-Type` header
    pub content_type: Option<String>,
    /// Digest stored in the integrity metadata, if the object has one
    pub sha256: Option<String>,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// `ETag` of the stored object
    pub etag: Option<String>,
    /// Version id assigned by a versioned bucket
    pub version_id: Option<String>,
}

impl PutOutcome {
    pub(crate) fn from_response(response: &HttpResponse) -> Self {
        Self {
            etag: response.header("etag").map(String::from),
            version_id: response.header("x-amz-version-id").map(String::from),
        }
    }
}

/// `GET /<key>[?versionId=<id>]`, verified against the integrity metadata.
#[derive(Debug, Clone)]
pub struct GetObject {
    bucket: String,
    key: String,
    version_id: Option<String>,
}

impl GetObject {
    /// Fetch the current version of `key`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    /// Fetch a specific version of `key`.
    pub fn version(
        bucket: impl Into<String>,
        key: impl Into<String>,
        version_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }
}

impl Operation for GetObject {
    type Output = Object;

    fn request(&self) -> Result<S3Request, S3Error> {
        let request = S3Request::new(Method::GET, &self.bucket, &self.key);
        Ok(match &self.version_id {
            Some(version_id) => request.with_query("versionId", version_id),
            None => request,
        })
    }

    fn parse(&self, response: HttpResponse) -> Result<Object, S3Error> {
        let sha256 = response.header(CONTENT_SHA256_META).map(|value| value.trim().to_string());

        if let Some(expected) = &sha256 {
            let actual = sha256_hex(&response.body);
            if *expected != actual {
                return Err(S3Error::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(Object {
            etag: response.header("etag").map(String::from),
            version_id: response.header("x-amz-version-id").map(String::from),
            content_type: response.header("content-type").map(String::from),
            sha256,
            body: response.body,
        })
    }
}

/// Single-request `PUT /<key>` carrying the integrity metadata.
#[derive(Debug, Clone)]
pub struct PutObject {
    bucket: String,
    key: String,
    body: Bytes,
    sha256: String,
    content_type: Option<String>,
}

impl PutObject {
    /// Upload `body` as `key`. The digest is computed once, here.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            bucket: bucket.into(),
            key: key.into(),
            sha256: sha256_hex(&body),
            body,
            content_type: None,
        }
    }

    /// Set the `Content-Type` of the stored object.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Hex SHA-256 of the body.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

impl Operation for PutObject {
    type Output = PutOutcome;

    fn request(&self) -> Result<S3Request, S3Error> {
        let mut request = S3Request::new(Method::PUT, &self.bucket, &self.key)
            .with_header(CONTENT_SHA256_META, &self.sha256)
            .with_body(self.body.clone());
        if let Some(content_type) = &self.content_type {
            request = request.with_header("content-type", content_type);
        }
        Ok(request)
    }

    fn parse(&self, response: HttpResponse) -> Result<PutOutcome, S3Error> {
        Ok(PutOutcome::from_response(&response))
    }
}

/// `DELETE /<key>`.
#[derive(Debug, Clone)]
pub struct DeleteObject {
    bucket: String,
    key: String,
}

impl DeleteObject {
    /// Delete `key`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Operation for DeleteObject {
    type Output = ();

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::DELETE, &self.bucket, &self.key))
    }

    fn parse(&self, _response: HttpResponse) -> Result<(), S3Error> {
        Ok(())
    }
}
