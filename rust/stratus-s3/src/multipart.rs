//! Multipart uploads.
//!
//! An upload moves through `Initiate → UploadPart* → Complete`. Once
//! Initiate has produced an upload id the store bills for the parts until
//! the upload is completed or aborted, so [`upload`] attempts an Abort after
//! any later failure, cancellation included. The Abort runs under its own
//! token so a user cancel cannot skip it.

use std::ops::Range;

use bytes::Bytes;
use reqwest::Method;
use stratus_signer::hash::{md5_base64, sha256_hex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::executor::classify_embedded;
use crate::object::{CONTENT_SHA256_META, PutOutcome};
use crate::xml;
use crate::{Connection, HttpResponse, Operation, S3Error, S3Request, Target};

/// Byte ranges of the parts `len` bytes split into.
///
/// Every part is `part_size` bytes except the last, which takes the
/// remainder. An empty object still has one (empty) part.
pub fn plan_parts(len: usize, part_size: usize) -> Vec<Range<usize>> {
    if len == 0 || part_size == 0 {
        return vec![0..len];
    }
    (0..len.div_ceil(part_size))
        .map(|index| {
            let start = index * part_size;
            start..(start + part_size).min(len)
        })
        .collect()
}

/// A part the store has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub number: u32,
    /// `ETag` returned for the part, quotes included
    pub etag: String,
}

/// `POST /<key>?uploads`.
#[derive(Debug, Clone)]
pub struct InitiateMultipartUpload {
    bucket: String,
    key: String,
    sha256: String,
}

impl InitiateMultipartUpload {
    /// Start an upload of `key` whose whole content hashes to `sha256`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            sha256: sha256.into(),
        }
    }
}

impl Operation for InitiateMultipartUpload {
    type Output = String;

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::POST, &self.bucket, &self.key)
            .with_query("uploads", "")
            .with_header(CONTENT_SHA256_META, &self.sha256))
    }

    fn parse(&self, response: HttpResponse) -> Result<String, S3Error> {
        xml::text_at(&response.body, &["InitiateMultipartUploadResult", "UploadId"])?
            .filter(|upload_id| !upload_id.is_empty())
            .ok_or_else(|| {
                S3Error::Malformed("InitiateMultipartUploadResult has no UploadId".into())
            })
    }
}

/// `PUT /<key>?partNumber=<n>&uploadId=<id>`.
#[derive(Debug, Clone)]
pub struct UploadPart {
    bucket: String,
    key: String,
    upload_id: String,
    number: u32,
    body: Bytes,
    content_md5: String,
}

impl UploadPart {
    /// Upload `body` as part `number`.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        number: u32,
        body: Bytes,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            number,
            content_md5: md5_base64(&body),
            body,
        }
    }
}

impl Operation for UploadPart {
    type Output = CompletedPart;

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::PUT, &self.bucket, &self.key)
            .with_query("partNumber", self.number.to_string())
            .with_query("uploadId", &self.upload_id)
            .with_header("content-md5", &self.content_md5)
            .with_body(self.body.clone()))
    }

    fn parse(&self, response: HttpResponse) -> Result<CompletedPart, S3Error> {
        let etag = response
            .header("etag")
            .filter(|etag| !etag.is_empty())
            .ok_or_else(|| {
                S3Error::Malformed(format!("Part {} was acknowledged without an ETag", self.number))
            })?;
        Ok(CompletedPart {
            number: self.number,
            etag: etag.to_string(),
        })
    }
}

/// `POST /<key>?uploadId=<id>` with the ordered part list.
#[derive(Debug, Clone)]
pub struct CompleteMultipartUpload {
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
}

impl CompleteMultipartUpload {
    /// Complete the upload from `parts`; they are sent in part-number order.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        mut parts: Vec<CompletedPart>,
    ) -> Self {
        parts.sort_by_key(|part| part.number);
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            parts,
        }
    }

    fn body(&self) -> String {
        let mut body = String::from("<CompleteMultipartUpload>");
        for part in &self.parts {
            body.push_str(&format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                part.number,
                xml::escape(&part.etag)
            ));
        }
        body.push_str("</CompleteMultipartUpload>");
        body
    }
}

impl Operation for CompleteMultipartUpload {
    type Output = PutOutcome;

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::POST, &self.bucket, &self.key)
            .with_query("uploadId", &self.upload_id)
            .with_header("content-type", "application/xml")
            .with_body(self.body()))
    }

    fn parse(&self, response: HttpResponse) -> Result<PutOutcome, S3Error> {
        // The store may accept the request and fail while assembling parts.
        if xml::root_element(&response.body).as_deref() == Some("Error") {
            return Err(classify_embedded(&response.body));
        }

        let mut outcome = PutOutcome::from_response(&response);
        if outcome.etag.is_none() {
            outcome.etag = xml::text_at(&response.body, &["CompleteMultipartUploadResult", "ETag"])?
                .filter(|etag| !etag.is_empty());
        }
        Ok(outcome)
    }
}

/// `DELETE /<key>?uploadId=<id>`.
#[derive(Debug, Clone)]
pub struct AbortMultipartUpload {
    bucket: String,
    key: String,
    upload_id: String,
}

impl AbortMultipartUpload {
    /// Abort `upload_id`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, upload_id: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
        }
    }
}

impl Operation for AbortMultipartUpload {
    type Output = ();

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::DELETE, &self.bucket, &self.key)
            .with_query("uploadId", &self.upload_id))
    }

    fn parse(&self, _response: HttpResponse) -> Result<(), S3Error> {
        Ok(())
    }
}

/// Upload `body` as `key` in parts of `part_size` bytes.
///
/// Every step is retried on its own. If anything fails after Initiate, an
/// Abort is attempted (without regard to `cancel`) and the original failure
/// is returned; a failing Abort is only logged.
pub async fn upload(
    connection: &Connection,
    target: &Target,
    bucket: &str,
    key: &str,
    body: Bytes,
    part_size: usize,
    cancel: &CancellationToken,
) -> Result<PutOutcome, S3Error> {
    let sha256 = sha256_hex(&body);
    let upload_id = connection
        .perform(&InitiateMultipartUpload::new(bucket, key, &sha256), target, cancel)
        .await?;
    info!(bucket, key, upload_id = %upload_id, size = body.len(), "Started multipart upload");

    let result = upload_parts(connection, target, bucket, key, &upload_id, &body, part_size, cancel).await;

    match result {
        Ok(outcome) => {
            info!(bucket, key, upload_id = %upload_id, "Completed multipart upload");
            Ok(outcome)
        }
        Err(error) => {
            warn!(bucket, key, upload_id = %upload_id, error = %error, "Multipart upload failed, aborting");
            let cleanup = CancellationToken::new();
            if let Err(abort_error) = connection
                .perform(&AbortMultipartUpload::new(bucket, key, &upload_id), target, &cleanup)
                .await
            {
                warn!(
                    bucket,
                    key,
                    upload_id = %upload_id,
                    error = %abort_error,
                    "Failed to abort multipart upload"
                );
            }
            Err(error)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_parts(
    connection: &Connection,
    target: &Target,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: &Bytes,
    part_size: usize,
    cancel: &CancellationToken,
) -> Result<PutOutcome, S3Error> {
    let mut parts = Vec::new();
    for (index, range) in plan_parts(body.len(), part_size).into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(S3Error::Canceled);
        }
        let number = index as u32 + 1;
        debug!(key, number, size = range.len(), "Uploading part");
        let part = UploadPart::new(bucket, key, upload_id, number, body.slice(range));
        parts.push(connection.perform(&part, target, cancel).await?);
    }

    if cancel.is_cancelled() {
        return Err(S3Error::Canceled);
    }
    connection
        .perform(
            &CompleteMultipartUpload::new(bucket, key, upload_id, parts),
            target,
            cancel,
        )
        .await
}
