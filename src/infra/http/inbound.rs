//! Translate an axum request into the relay's view of the visitor request.

use axum::http::{
    HeaderMap, Uri,
    header::{CONTENT_TYPE, HOST},
};
use axum_extra::extract::cookie::CookieJar;

use crate::domain::{
    inbound::{InboundRequest, RequestParams},
    render::TRACKING_COOKIE,
};

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Build the inbound request from the head, the cookie jar and an already-buffered body.
///
/// Query parameters come first; urlencoded form fields override colliding keys.
pub fn inbound_request(
    uri: &Uri,
    headers: &HeaderMap,
    jar: &CookieJar,
    body: &[u8],
    assume_https: bool,
) -> InboundRequest {
    let mut params = RequestParams::parse(uri.query().unwrap_or(""));
    if is_form(headers) {
        params.overlay(&RequestParams::parse(&String::from_utf8_lossy(body)));
    }

    InboundRequest {
        https: assume_https || forwarded_https(headers) || uri.scheme_str() == Some("https"),
        host: header_str(headers, HOST.as_str())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|authority| authority.to_string())),
        forwarded_host: header_str(headers, X_FORWARDED_HOST).map(str::to_string),
        request_uri: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        tracking_id: jar
            .get(TRACKING_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|tid| !tid.is_empty()),
        params,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn forwarded_https(headers: &HeaderMap) -> bool {
    header_str(headers, X_FORWARDED_PROTO)
        .and_then(|value| value.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

fn is_form(headers: &HeaderMap) -> bool {
    header_str(headers, CONTENT_TYPE.as_str())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}
