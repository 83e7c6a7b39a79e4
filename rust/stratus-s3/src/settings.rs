//! Bucket-level settings, signed with the legacy scheme.

use reqwest::Method;
use stratus_signer::hash::md5_base64;
use stratus_signer::{is_default_region, normalize_region};

use crate::xml::{self, ElementHandler};
use crate::{HttpResponse, Operation, S3Error, S3Request};

const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// `GET /?location`; yields the normalized signing region.
#[derive(Debug, Clone)]
pub struct GetBucketLocation {
    bucket: String,
}

impl GetBucketLocation {
    /// Look up where `bucket` lives.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

impl Operation for GetBucketLocation {
    type Output = String;

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::GET, &self.bucket, "")
            .with_query("location", "")
            .legacy())
    }

    fn parse(&self, response: HttpResponse) -> Result<String, S3Error> {
        let location = xml::text_at(&response.body, &["LocationConstraint"])?.ok_or_else(|| {
            S3Error::Malformed("Expected a LocationConstraint document".into())
        })?;
        Ok(normalize_region(&location))
    }
}

/// Versioning state of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningStatus {
    /// Versioning was never turned on
    Unversioned,
    /// New writes create new versions
    Enabled,
    /// Versioning was turned on and later suspended
    Suspended,
}

impl VersioningStatus {
    /// Whether new writes create versions.
    pub fn is_enabled(&self) -> bool {
        matches!(self, VersioningStatus::Enabled)
    }
}

/// `GET /?versioning`.
#[derive(Debug, Clone)]
pub struct GetBucketVersioning {
    bucket: String,
}

impl GetBucketVersioning {
    /// Read the versioning state of `bucket`.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

impl Operation for GetBucketVersioning {
    type Output = VersioningStatus;

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::GET, &self.bucket, "")
            .with_query("versioning", "")
            .legacy())
    }

    fn parse(&self, response: HttpResponse) -> Result<VersioningStatus, S3Error> {
        if xml::root_element(&response.body).as_deref() != Some("VersioningConfiguration") {
            return Err(S3Error::Malformed(
                "Expected a VersioningConfiguration document".into(),
            ));
        }

        let status = xml::text_at(&response.body, &["VersioningConfiguration", "Status"])?;
        match status.as_deref().map(str::trim) {
            None | Some("") => Ok(VersioningStatus::Unversioned),
            Some("Enabled") => Ok(VersioningStatus::Enabled),
            Some("Suspended") => Ok(VersioningStatus::Suspended),
            Some(other) => Err(S3Error::Malformed(format!(
                "Unknown versioning status {:?}",
                other
            ))),
        }
    }
}

/// `PUT /?versioning`.
#[derive(Debug, Clone)]
pub struct SetBucketVersioning {
    bucket: String,
    enabled: bool,
}

impl SetBucketVersioning {
    /// Enable or suspend versioning on `bucket`.
    pub fn new(bucket: impl Into<String>, enabled: bool) -> Self {
        Self {
            bucket: bucket.into(),
            enabled,
        }
    }

    fn body(&self) -> String {
        format!(
            "<VersioningConfiguration xmlns=\"{}\"><Status>{}</Status></VersioningConfiguration>",
            S3_XMLNS,
            if self.enabled { "Enabled" } else { "Suspended" }
        )
    }
}

impl Operation for SetBucketVersioning {
    type Output = ();

    fn request(&self) -> Result<S3Request, S3Error> {
        let body = self.body();
        Ok(S3Request::new(Method::PUT, &self.bucket, "")
            .with_query("versioning", "")
            .with_header("content-md5", md5_base64(body.as_bytes()))
            .with_header("content-type", "application/xml")
            .with_body(body)
            .legacy())
    }

    fn parse(&self, _response: HttpResponse) -> Result<(), S3Error> {
        Ok(())
    }
}

/// A permission granted on a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grant {
    /// Canonical user id, group URI or email of the grantee
    pub grantee: String,
    /// `FULL_CONTROL`, `READ`, `WRITE`, …
    pub permission: String,
}

/// Owner and grants of a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlPolicy {
    /// Canonical id of the owner
    pub owner_id: String,
    /// Display name of the owner
    pub owner_name: String,
    /// Grants in document order
    pub grants: Vec<Grant>,
}

#[derive(Default)]
struct AclHandler {
    policy: AccessControlPolicy,
    grant: Grant,
}

const GRANT_PATH: &[&str] = &["AccessControlPolicy", "AccessControlList", "Grant"];

impl ElementHandler for AclHandler {
    fn text(&mut self, path: &[String], text: &str) {
        if xml::at(path, &["AccessControlPolicy", "Owner", "ID"]) {
            self.policy.owner_id.push_str(text);
        } else if xml::at(path, &["AccessControlPolicy", "Owner", "DisplayName"]) {
            self.policy.owner_name.push_str(text);
        } else if path.len() == 4 && xml::at(&path[..3], GRANT_PATH) && path[3] == "Permission" {
            self.grant.permission.push_str(text);
        } else if path.len() == 5 && xml::at(&path[..3], GRANT_PATH) && path[3] == "Grantee" {
            if matches!(path[4].as_str(), "ID" | "URI" | "EmailAddress") {
                self.grant.grantee.push_str(text);
            }
        }
    }

    fn end(&mut self, path: &[String]) {
        if xml::at(path, GRANT_PATH) {
            self.policy.grants.push(std::mem::take(&mut self.grant));
        }
    }
}

/// `GET /?acl`.
#[derive(Debug, Clone)]
pub struct GetBucketAcl {
    bucket: String,
}

impl GetBucketAcl {
    /// Read the access control policy of `bucket`.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

impl Operation for GetBucketAcl {
    type Output = AccessControlPolicy;

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::new(Method::GET, &self.bucket, "")
            .with_query("acl", "")
            .legacy())
    }

    fn parse(&self, response: HttpResponse) -> Result<AccessControlPolicy, S3Error> {
        if xml::root_element(&response.body).as_deref() != Some("AccessControlPolicy") {
            return Err(S3Error::Malformed(
                "Expected an AccessControlPolicy document".into(),
            ));
        }
        let mut handler = AclHandler::default();
        xml::parse(&response.body, &mut handler)?;
        Ok(handler.policy)
    }
}

/// `PUT /` on a new bucket's host.
#[derive(Debug, Clone)]
pub struct CreateBucket {
    bucket: String,
    region: String,
}

impl CreateBucket {
    /// Create `bucket` in `region`.
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    fn body(&self) -> String {
        if is_default_region(&self.region) {
            return String::new();
        }
        format!(
            "<CreateBucketConfiguration xmlns=\"{}\"><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
            S3_XMLNS,
            xml::escape(&self.region)
        )
    }
}

impl Operation for CreateBucket {
    type Output = ();

    fn request(&self) -> Result<S3Request, S3Error> {
        let body = self.body();
        let mut request = S3Request::new(Method::PUT, &self.bucket, "");
        if !body.is_empty() {
            request = request
                .with_header("content-type", "application/xml")
                .with_body(body);
        }
        Ok(request.legacy())
    }

    fn parse(&self, _response: HttpResponse) -> Result<(), S3Error> {
        Ok(())
    }
}
