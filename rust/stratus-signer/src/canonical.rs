use std::collections::BTreeMap;
use std::fmt::Write;

use url::Url;

use crate::SigningError;
use crate::hash::{EMPTY_PAYLOAD_SHA256, hex_encode, sha256};

/// A SigV4 canonical request.
///
/// Built per attempt from the method, the (unencoded) path, query parameters,
/// the headers to sign and the hash of the body. Header names are lower-cased
/// and kept sorted; query parameters are sorted when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    payload_hash: String,
}

impl CanonicalRequest {
    /// Start a canonical request for `method` on the unencoded `path`.
    ///
    /// The payload hash defaults to the hash of an empty body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method: method.into(),
            path: if path.is_empty() { "/".into() } else { path },
            query: Vec::new(),
            headers: BTreeMap::new(),
            payload_hash: EMPTY_PAYLOAD_SHA256.into(),
        }
    }

    /// Add a query parameter. Sub-resources without a value use `""`.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a header to sign. The name is lower-cased and the value trimmed.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.headers.insert(
            name.as_ref().to_lowercase(),
            value.as_ref().trim().to_string(),
        );
        self
    }

    /// Set the lower-case hex SHA-256 of the body.
    pub fn with_payload_hash(mut self, payload_hash: impl Into<String>) -> Self {
        self.payload_hash = payload_hash.into();
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Signed headers, sorted by name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Body hash.
    pub fn payload_hash(&self) -> &str {
        &self.payload_hash
    }

    /// Percent-encoded path as it appears on the wire.
    pub fn canonical_uri(&self) -> String {
        percent_encode_path(&self.path)
    }

    /// Sorted, percent-encoded query string.
    pub fn canonical_query(&self) -> String {
        let mut query = self.query.clone();
        query.sort();
        query
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Semicolon-joined list of signed header names.
    pub fn signed_headers(&self) -> String {
        self.headers
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// The full canonical request string.
    pub fn canonical_string(&self) -> String {
        let mut headers = String::new();
        for (name, value) in &self.headers {
            let _ = writeln!(headers, "{}:{}", name, value);
        }

        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.canonical_uri(),
            self.canonical_query(),
            headers,
            self.signed_headers(),
            self.payload_hash
        )
    }

    /// Lower-case hex SHA-256 of the canonical request string.
    pub fn hash(&self) -> String {
        hex_encode(&sha256(self.canonical_string().as_bytes()))
    }
}

/// Percent-encode a string per RFC 3986, leaving only unreserved characters.
pub fn percent_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{:02X}", byte);
            }
        }
    }
    result
}

/// Percent-encode a URL path (preserving slashes).
pub fn percent_encode_path(path: &str) -> String {
    path.split('/')
        .map(percent_encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the URL that carries `path` and the already-rendered `query`.
///
/// Fails when parsing would rewrite the encoded path, so the path on the wire
/// is always the one in the canonical request.
pub fn request_url(
    scheme: &str,
    host: &str,
    path: &str,
    query: &str,
) -> Result<Url, SigningError> {
    let encoded = if path.is_empty() {
        "/".to_string()
    } else {
        percent_encode_path(path)
    };

    let mut raw = format!("{}://{}{}", scheme, host, encoded);
    if !query.is_empty() {
        raw.push('?');
        raw.push_str(query);
    }

    let url = Url::parse(&raw).map_err(|error| SigningError::InvalidUrl(error.to_string()))?;
    if url.path() != encoded {
        return Err(SigningError::DotSegment(path.to_string()));
    }
    Ok(url)
}
