//! Object and bucket listings.
//!
//! Objects are listed with the marker-based `GET /?prefix=&marker=` call. The
//! store truncates long listings; [`list_objects`] keeps re-issuing the call
//! with the greatest key seen so far as the marker until a page comes back
//! untruncated.

use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::xml::{self, ElementHandler};
use crate::{Connection, HttpResponse, Operation, S3Error, S3Request, Target};

/// One entry of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// `ETag`, quotes included
    pub etag: String,
    /// Last modification time as reported by the store
    pub last_modified: String,
}

/// Outcome of listing a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// At least one object matched, in key order
    Found(Vec<ObjectSummary>),
    /// Nothing matched across the whole listing
    NoObjectsFound,
}

impl Listing {
    /// The listed objects; empty for [`Listing::NoObjectsFound`].
    pub fn objects(&self) -> &[ObjectSummary] {
        match self {
            Listing::Found(objects) => objects,
            Listing::NoObjectsFound => &[],
        }
    }

    /// Consume the listing into its objects.
    pub fn into_objects(self) -> Vec<ObjectSummary> {
        match self {
            Listing::Found(objects) => objects,
            Listing::NoObjectsFound => Vec::new(),
        }
    }
}

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries on this page
    pub objects: Vec<ObjectSummary>,
    /// Whether more entries follow
    pub is_truncated: bool,
}

impl ListPage {
    /// Parse a `ListBucketResult` document.
    pub fn parse(body: &[u8]) -> Result<Self, S3Error> {
        if xml::root_element(body).as_deref() != Some("ListBucketResult") {
            return Err(S3Error::Malformed(
                "Expected a ListBucketResult document".into(),
            ));
        }

        let mut handler = PageHandler::default();
        xml::parse(body, &mut handler)?;
        if let Some(error) = handler.error {
            return Err(error);
        }
        Ok(handler.page)
    }
}

#[derive(Default)]
struct PageHandler {
    page: ListPage,
    current: ObjectSummary,
    size: String,
    truncated: String,
    error: Option<S3Error>,
}

impl ElementHandler for PageHandler {
    fn start(&mut self, path: &[String]) {
        if xml::at(path, &["ListBucketResult", "Contents"]) {
            self.current = ObjectSummary::default();
            self.size.clear();
        }
    }

    fn text(&mut self, path: &[String], text: &str) {
        if xml::at(path, &["ListBucketResult", "IsTruncated"]) {
            self.truncated.push_str(text);
            return;
        }
        if path.len() != 3 || path[0] != "ListBucketResult" || path[1] != "Contents" {
            return;
        }
        match path[2].as_str() {
            "Key" => self.current.key.push_str(text),
            "Size" => self.size.push_str(text),
            "ETag" => self.current.etag.push_str(text),
            "LastModified" => self.current.last_modified.push_str(text),
            _ => {}
        }
    }

    fn end(&mut self, path: &[String]) {
        if xml::at(path, &["ListBucketResult", "IsTruncated"]) {
            self.page.is_truncated = self.truncated.trim() == "true";
        } else if xml::at(path, &["ListBucketResult", "Contents"]) {
            let mut object = std::mem::take(&mut self.current);
            if !self.size.is_empty() {
                match self.size.trim().parse() {
                    Ok(size) => object.size = size,
                    Err(_) => {
                        self.error.get_or_insert(S3Error::Malformed(format!(
                            "Invalid size {:?} for {}",
                            self.size, object.key
                        )));
                    }
                }
            }
            self.page.objects.push(object);
        }
    }
}

/// `GET /?prefix=<prefix>[&marker=<marker>]`.
#[derive(Debug, Clone)]
pub struct ListObjectsPage {
    bucket: String,
    prefix: String,
    marker: Option<String>,
}

impl ListObjectsPage {
    /// The page of `prefix` that starts after `marker`.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>, marker: Option<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            marker,
        }
    }
}

impl Operation for ListObjectsPage {
    type Output = ListPage;

    fn request(&self) -> Result<S3Request, S3Error> {
        let mut request =
            S3Request::new(Method::GET, &self.bucket, "").with_query("prefix", &self.prefix);
        if let Some(marker) = &self.marker {
            request = request.with_query("marker", marker);
        }
        Ok(request)
    }

    fn parse(&self, response: HttpResponse) -> Result<ListPage, S3Error> {
        ListPage::parse(&response.body)
    }
}

/// List everything under `prefix`, page by page.
///
/// Each page is retried on its own. Entries at or below the marker of the
/// request that returned them are dropped, so a store that repeats the
/// boundary key does not produce duplicates.
pub async fn list_objects(
    connection: &Connection,
    target: &Target,
    bucket: &str,
    prefix: &str,
    cancel: &CancellationToken,
) -> Result<Listing, S3Error> {
    let mut objects: Vec<ObjectSummary> = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let page = connection
            .perform(
                &ListObjectsPage::new(bucket, prefix, marker.clone()),
                target,
                cancel,
            )
            .await?;

        let previous = marker.clone();
        for object in page.objects {
            if previous.as_ref().is_some_and(|marker| object.key <= *marker) {
                continue;
            }
            if marker.as_ref().is_none_or(|marker| object.key > *marker) {
                marker = Some(object.key.clone());
            }
            objects.push(object);
        }

        if !page.is_truncated {
            break;
        }

        if marker == previous {
            warn!(bucket, prefix, "Truncated listing page made no progress");
            return Err(S3Error::Malformed(
                "Truncated listing page contained no new keys".into(),
            ));
        }
        debug!(bucket, prefix, marker = ?marker, "Fetching next listing page");
    }

    if objects.is_empty() {
        Ok(Listing::NoObjectsFound)
    } else {
        Ok(Listing::Found(objects))
    }
}

/// One bucket owned by the account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSummary {
    /// Bucket name
    pub name: String,
    /// Creation time as reported by the store
    pub creation_date: String,
}

/// `GET /` on the service host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListBuckets;

impl Operation for ListBuckets {
    type Output = Vec<BucketSummary>;

    fn request(&self) -> Result<S3Request, S3Error> {
        Ok(S3Request::service(Method::GET))
    }

    fn parse(&self, response: HttpResponse) -> Result<Vec<BucketSummary>, S3Error> {
        if xml::root_element(&response.body).as_deref() != Some("ListAllMyBucketsResult") {
            return Err(S3Error::Malformed(
                "Expected a ListAllMyBucketsResult document".into(),
            ));
        }

        let mut handler = BucketsHandler::default();
        xml::parse(&response.body, &mut handler)?;
        Ok(handler.buckets)
    }
}

#[derive(Default)]
struct BucketsHandler {
    buckets: Vec<BucketSummary>,
    current: BucketSummary,
}

const BUCKET_PATH: &[&str] = &["ListAllMyBucketsResult", "Buckets", "Bucket"];

impl ElementHandler for BucketsHandler {
    fn text(&mut self, path: &[String], text: &str) {
        if path.len() != 4 || !xml::at(&path[..3], BUCKET_PATH) {
            return;
        }
        match path[3].as_str() {
            "Name" => self.current.name.push_str(text),
            "CreationDate" => self.current.creation_date.push_str(text),
            _ => {}
        }
    }

    fn end(&mut self, path: &[String]) {
        if xml::at(path, BUCKET_PATH) {
            self.buckets.push(std::mem::take(&mut self.current));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{self, ScriptedTransport, list_page, ok};
    use pretty_assertions::assert_eq;

    #[test]
    fn it_parses_a_page_with_entries() -> anyhow::Result<()> {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
                <Name>photos</Name>
                <Prefix>2024/</Prefix>
                <Marker></Marker>
                <IsTruncated>true</IsTruncated>
                <Contents>
                    <Key>2024/a.jpg</Key>
                    <LastModified>2024-03-01T12:00:00.000Z</LastModified>
                    <ETag>&quot;fba9dede5f27731c9771645a39863328&quot;</ETag>
                    <Size>434234</Size>
                    <StorageClass>STANDARD</StorageClass>
                </Contents>
                <Contents>
                    <Key>2024/b.jpg</Key>
                    <Size>12</Size>
                </Contents>
            </ListBucketResult>"#;

        let page = ListPage::parse(body.as_bytes())?;
        assert!(page.is_truncated);
        assert_eq!(
            page.objects,
            vec![
                ObjectSummary {
                    key: "2024/a.jpg".into(),
                    size: 434234,
                    etag: "\"fba9dede5f27731c9771645a39863328\"".into(),
                    last_modified: "2024-03-01T12:00:00.000Z".into(),
                },
                ObjectSummary {
                    key: "2024/b.jpg".into(),
                    size: 12,
                    ..Default::default()
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn it_parses_an_empty_page() -> anyhow::Result<()> {
        let page = ListPage::parse(b"<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>")?;
        assert_eq!(page, ListPage::default());
        Ok(())
    }

    #[test]
    fn it_rejects_unexpected_documents() {
        assert!(matches!(
            ListPage::parse(b"<WrongRootElement><IsTruncated>false</IsTruncated></WrongRootElement>"),
            Err(S3Error::Malformed(_))
        ));
        assert!(matches!(
            ListPage::parse(b"this is not xml at all"),
            Err(S3Error::Malformed(_))
        ));
        assert!(matches!(
            ListPage::parse(b"<ListBucketResult><Contents><Key>a</Key><Size>big</Size></Contents></ListBucketResult>"),
            Err(S3Error::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn it_follows_truncation_across_three_pages() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new();
        transport.push(list_page(&["a", "b"], true));
        // The store repeats the boundary key; it must not show up twice.
        transport.push(list_page(&["b", "c", "d"], true));
        transport.push(list_page(&["e"], false));

        let (connection, target) = helpers::connection(&transport);
        let listing =
            list_objects(&connection, &target, "photos", "", &CancellationToken::new()).await?;

        let keys: Vec<_> = listing.objects().iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);

        let markers: Vec<Option<String>> = transport
            .requests()
            .iter()
            .map(|request| {
                request
                    .url
                    .query_pairs()
                    .find(|(name, _)| name == "marker")
                    .map(|(_, value)| value.into_owned())
            })
            .collect();
        assert_eq!(markers, vec![None, Some("b".into()), Some("d".into())]);
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_no_objects_found() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new();
        transport.push(list_page(&[], false));

        let (connection, target) = helpers::connection(&transport);
        let listing = list_objects(
            &connection,
            &target,
            "photos",
            "missing/",
            &CancellationToken::new(),
        )
        .await?;

        assert_eq!(listing, Listing::NoObjectsFound);
        assert!(listing.objects().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_to_loop_on_a_stuck_truncated_listing() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new();
        transport.push(list_page(&["a"], true));
        transport.push(list_page(&["a"], true));

        let (connection, target) = helpers::connection(&transport);
        let result =
            list_objects(&connection, &target, "photos", "", &CancellationToken::new()).await;

        assert!(matches!(result, Err(S3Error::Malformed(_))));
        assert_eq!(transport.requests().len(), 2);
        Ok(())
    }

    #[test]
    fn it_parses_the_bucket_list() -> anyhow::Result<()> {
        let body = r#"<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
            <Owner><ID>owner</ID><DisplayName>me</DisplayName></Owner>
            <Buckets>
                <Bucket><Name>photos</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>
                <Bucket><Name>videos</Name><CreationDate>2024-02-01T00:00:00.000Z</CreationDate></Bucket>
            </Buckets>
        </ListAllMyBucketsResult>"#;

        let buckets = ListBuckets.parse(ok(body))?;
        assert_eq!(
            buckets,
            vec![
                BucketSummary {
                    name: "photos".into(),
                    creation_date: "2024-01-01T00:00:00.000Z".into(),
                },
                BucketSummary {
                    name: "videos".into(),
                    creation_date: "2024-02-01T00:00:00.000Z".into(),
                },
            ]
        );
        Ok(())
    }
}
