//! One-shot relay driven from the command line, printing a CGI-style response.

use std::time::Duration;

use axum::http::StatusCode;
use url::Url;

use crate::{
    config::RenderArgs,
    domain::{
        inbound::{CONVERSION_PARAM, InboundRequest, RequestParams},
        render::{Outcome, RenderedPage},
    },
};

use super::http::tracking_cookie;

/// Describe the simulated visitor request named by the `render` arguments.
pub fn inbound_from_args(
    args: &RenderArgs,
    assume_https: bool,
) -> Result<InboundRequest, url::ParseError> {
    let url = Url::parse(&args.url)?;

    let mut params = RequestParams::parse(url.query().unwrap_or(""));
    params.overlay(&args.params.iter().cloned().collect::<RequestParams>());
    if let Some(hash) = args.hash.as_deref() {
        params.insert(CONVERSION_PARAM, hash);
    }

    let host = url.host_str().map(|host| match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    });
    let request_uri = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };

    Ok(InboundRequest {
        https: assume_https || url.scheme() == "https",
        host,
        forwarded_host: args.forwarded_host.clone(),
        request_uri,
        tracking_id: args.tid.clone().filter(|tid| !tid.is_empty()),
        params,
    })
}

/// Render an outcome as a CGI document: header lines, a blank line, then the body.
pub fn document(outcome: &Outcome, cookie_max_age: Duration) -> String {
    match outcome {
        Outcome::Rendered(RenderedPage { status, html, tid }) => {
            let cookie = tracking_cookie(tid.clone(), cookie_max_age);
            format!(
                "Status: {}\r\nSet-Cookie: {}\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{html}",
                status_line(*status),
                cookie.encoded()
            )
        }
        Outcome::Redirected { location } => {
            format!("Status: 302 Found\r\nLocation: {location}\r\n\r\n")
        }
        Outcome::Passthrough { status, body } => format!(
            "Status: {}\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{body}",
            status_line(*status)
        ),
    }
}

fn status_line(status: u16) -> String {
    match StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
    {
        Some(reason) => format!("{status} {reason}"),
        None => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(url: &str) -> RenderArgs {
        RenderArgs {
            overrides: Default::default(),
            url: url.to_string(),
            hash: None,
            tid: None,
            forwarded_host: None,
            params: Vec::new(),
        }
    }

    #[test]
    fn url_becomes_host_uri_and_params() {
        let mut args = args("http://shop.test:8080/offer?utm=ads&hash=Q");
        args.params = vec![("email".to_string(), "a@b.test".to_string())];
        args.hash = Some("C9".to_string());
        args.tid = Some("T1".to_string());

        let inbound = inbound_from_args(&args, false).expect("inbound");

        assert!(!inbound.https);
        assert_eq!(inbound.host.as_deref(), Some("shop.test:8080"));
        assert_eq!(inbound.request_uri, "/offer?utm=ads&hash=Q");
        assert_eq!(inbound.tracking_id.as_deref(), Some("T1"));
        assert_eq!(inbound.conversion_hash(), Some("C9"));
        assert_eq!(inbound.params.get("email"), Some("a@b.test"));
    }

    #[test]
    fn https_url_sets_scheme() {
        let inbound = inbound_from_args(&args("https://shop.test/"), false).expect("inbound");
        assert!(inbound.https);
        assert_eq!(inbound.actual_link(), "https://shop.test/");
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(inbound_from_args(&args("not a url"), false).is_err());
    }

    #[test]
    fn rendered_document_carries_cookie_and_body() {
        let outcome = Outcome::Rendered(RenderedPage {
            status: 200,
            html: "<html></html>".to_string(),
            tid: "T1".to_string(),
        });

        let document = document(&outcome, Duration::from_secs(60));

        assert!(document.starts_with("Status: 200 OK\r\nSet-Cookie: tid=T1"));
        assert!(document.contains("Max-Age=60"));
        assert!(document.ends_with("\r\n\r\n<html></html>"));
    }

    #[test]
    fn tracking_cookie_value_is_percent_encoded() {
        let outcome = Outcome::Rendered(RenderedPage {
            status: 200,
            html: String::new(),
            tid: "a b;c".to_string(),
        });

        let document = document(&outcome, Duration::from_secs(60));

        assert!(document.contains("\r\nSet-Cookie: tid=a%20b%3Bc; "));
        assert!(!document.contains("a b;c"));
    }

    #[test]
    fn redirect_document_has_no_body() {
        let outcome = Outcome::Redirected {
            location: "https://x.test/p".to_string(),
        };
        assert_eq!(
            document(&outcome, Duration::from_secs(60)),
            "Status: 302 Found\r\nLocation: https://x.test/p\r\n\r\n"
        );
    }
}
