//! The visitor request as the relay sees it: an immutable value built by the shell.

use indexmap::IndexMap;
use url::form_urlencoded;

use crate::util::escape::escape_html;

/// Parameter carrying the optional conversion hash.
pub const CONVERSION_PARAM: &str = "hash";

/// Ordered request parameters; later writes replace earlier values in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams(IndexMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an `application/x-www-form-urlencoded` string.
    pub fn parse(encoded: &str) -> Self {
        let mut params = Self::new();
        for (key, value) in form_urlencoded::parse(encoded.as_bytes()) {
            params.insert(key.into_owned(), value.into_owned());
        }
        params
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Overlay `other` on top of `self`: colliding keys take `other`'s value but keep
    /// their original position, new keys are appended.
    pub fn overlay(&mut self, other: &RequestParams) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Re-encode as a form-urlencoded query string.
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.iter() {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

impl<K, V> FromIterator<(K, V)> for RequestParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Everything the relay reads from the inbound request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Whether the visitor reached us over TLS; decides the scheme of the canonical link.
    pub https: bool,
    /// `Host` header.
    pub host: Option<String>,
    /// `X-Forwarded-Host` header; preferred over `host` for attribution.
    pub forwarded_host: Option<String>,
    /// Raw request target (path and query) as received.
    pub request_uri: String,
    /// Tracking id from the visitor's `tid` cookie.
    pub tracking_id: Option<String>,
    /// Query parameters overlaid with form body parameters.
    pub params: RequestParams,
}

impl InboundRequest {
    /// Conversion hash from the `hash` parameter; blank values count as absent.
    pub fn conversion_hash(&self) -> Option<&str> {
        self.params
            .get(CONVERSION_PARAM)
            .filter(|value| !value.is_empty())
    }

    /// Host reported to the export API, preferring the forwarded host.
    pub fn attribution_host(&self) -> &str {
        match self.forwarded_host.as_deref() {
            Some(forwarded) if !forwarded.is_empty() => forwarded,
            _ => self.host.as_deref().unwrap_or_default(),
        }
    }

    /// Path reported to the export API, `/` when the request target is empty.
    pub fn attribution_path(&self) -> &str {
        if self.request_uri.is_empty() {
            "/"
        } else {
            &self.request_uri
        }
    }

    /// Canonical URL of this request, HTML-escaped for splicing into markup.
    pub fn actual_link(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!(
            "{scheme}://{}{}",
            self.host.as_deref().unwrap_or_default(),
            escape_html(&self.request_uri)
        )
    }
}
