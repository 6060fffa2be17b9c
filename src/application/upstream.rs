//! Port to the export rendering API and the pure pieces of building a call to it.

use async_trait::async_trait;
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::domain::{
    inbound::InboundRequest, render::UPSTREAM_TRACKER_COOKIE, session::ExportSession,
};

pub const EXPORT_SOURCE_HEADER: &str = "x-export-source";
pub const EXPORT_HOST_HEADER: &str = "x-export-host";
pub const EXPORT_PATH_HEADER: &str = "x-export-path";
pub const EXPORT_SOURCE_EMBED: &str = "embed";

/// Attribution headers telling the export API where the page is embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub host: String,
    pub path: String,
}

/// One outbound render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub url: Url,
    /// Value for the `Cookie` header, when the visitor already has a tracking id.
    pub cookie: Option<String>,
    pub attribution: Option<Attribution>,
}

/// Raw upstream answer; interpretation happens in the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: String,
}

/// Connection-level failure talking to the export API.
#[derive(Debug, Clone, Error)]
#[error("check upstream settings: {code} {message}")]
pub struct TransportError {
    pub code: &'static str,
    pub message: String,
}

impl TransportError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait RenderApi: Send + Sync {
    async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamReply, TransportError>;
}

/// Compose the render URL: `export_hash` alone, or `conversion_hash` then `export_hash`.
pub fn render_url(
    session: &ExportSession,
    conversion_hash: Option<&str>,
) -> Result<Url, url::ParseError> {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if let Some(hash) = conversion_hash.filter(|hash| !hash.is_empty()) {
        query.append_pair("conversion_hash", hash);
    }
    query.append_pair("export_hash", session.export_hash());

    Url::parse(&format!(
        "{}/api/render?{}",
        session.endpoint(),
        query.finish()
    ))
}

/// Attribution headers for the inbound request, or `None` when host or path is empty.
pub fn attribution(inbound: &InboundRequest) -> Option<Attribution> {
    let host = inbound.attribution_host();
    let path = inbound.attribution_path();
    if host.is_empty() || path.is_empty() || !header_safe(host) || !header_safe(path) {
        return None;
    }

    Some(Attribution {
        host: host.to_string(),
        path: path.to_string(),
    })
}

/// Build the full outbound request for one invocation.
pub fn build_request(
    session: &ExportSession,
    inbound: &InboundRequest,
) -> Result<UpstreamRequest, url::ParseError> {
    let url = render_url(session, inbound.conversion_hash())?;
    let cookie = inbound
        .tracking_id
        .as_deref()
        .filter(|tid| header_safe(tid))
        .map(|tid| format!("{UPSTREAM_TRACKER_COOKIE}=tid={tid}"));

    Ok(UpstreamRequest {
        url,
        cookie,
        attribution: attribution(inbound),
    })
}

/// Whether `value` can be sent as an HTTP header value (no control bytes other than tab).
fn header_safe(value: &str) -> bool {
    value
        .bytes()
        .all(|byte| byte == b'\t' || (byte >= 0x20 && byte != 0x7f))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ExportSession {
        ExportSession::new("https://export.test", "3660bbb0b7f101ba44ce", None).expect("session")
    }

    #[test]
    fn plain_view_targets_export_hash_only() {
        let url = render_url(&session(), None).expect("url");
        assert_eq!(
            url.as_str(),
            "https://export.test/api/render?export_hash=3660bbb0b7f101ba44ce"
        );

        let blank = render_url(&session(), Some("")).expect("url");
        assert_eq!(blank, url);
    }

    #[test]
    fn conversion_hash_precedes_export_hash() {
        let url = render_url(&session(), Some("conv 1&2")).expect("url");
        assert_eq!(
            url.query(),
            Some("conversion_hash=conv+1%262&export_hash=3660bbb0b7f101ba44ce")
        );
    }

    #[test]
    fn tracking_cookie_is_forwarded_under_tracker_name() {
        let inbound = InboundRequest {
            host: Some("shop.test".to_string()),
            request_uri: "/".to_string(),
            tracking_id: Some("T-42".to_string()),
            ..Default::default()
        };

        let request = build_request(&session(), &inbound).expect("request");
        assert_eq!(request.cookie.as_deref(), Some("stg-tracker=tid=T-42"));
    }

    #[test]
    fn tracking_id_with_control_characters_is_not_forwarded() {
        let inbound = InboundRequest {
            host: Some("shop.test".to_string()),
            request_uri: "/".to_string(),
            tracking_id: Some("abc\ndef".to_string()),
            ..Default::default()
        };

        let request = build_request(&session(), &inbound).expect("request");
        assert_eq!(request.cookie, None);
        assert!(request.attribution.is_some());
    }

    #[test]
    fn attribution_with_control_characters_is_dropped() {
        let inbound = InboundRequest {
            forwarded_host: Some("shop.test\r\nx-evil: 1".to_string()),
            request_uri: "/offer".to_string(),
            ..Default::default()
        };
        assert_eq!(attribution(&inbound), None);
    }

    #[test]
    fn attribution_requires_a_host() {
        let inbound = InboundRequest {
            request_uri: "/offer".to_string(),
            ..Default::default()
        };
        assert_eq!(attribution(&inbound), None);

        let inbound = InboundRequest {
            host: Some("shop.test".to_string()),
            forwarded_host: Some("www.shop.test".to_string()),
            request_uri: String::new(),
            ..Default::default()
        };
        assert_eq!(
            attribution(&inbound),
            Some(Attribution {
                host: "www.shop.test".to_string(),
                path: "/".to_string(),
            })
        );
    }
}
