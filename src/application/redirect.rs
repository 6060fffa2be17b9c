//! Rebuild an upstream redirect target so it carries the visitor's parameters
//! and none of the export's tracking parameters.

use url::Url;

use crate::domain::inbound::RequestParams;

/// Query keys that must never leak into the visitor-facing redirect.
const STRIPPED_PARAMS: [&str; 2] = ["tid", "export_hash"];

/// Merge `inbound` into the redirect's query (inbound wins), drop the export's
/// tracking keys and reassemble the URL without empty components.
pub fn unset_export_param(redirect: &str, inbound: &RequestParams) -> String {
    let without_fragment = redirect.split('#').next().unwrap_or(redirect);
    let (target, query) = match without_fragment.split_once('?') {
        Some((target, query)) => (target, query),
        None => (without_fragment, ""),
    };

    let mut params = RequestParams::parse(query);
    params.overlay(inbound);
    for key in STRIPPED_PARAMS {
        params.remove(key);
    }

    let mut rebuilt = base_of(target);
    if !params.is_empty() {
        rebuilt.push('?');
        rebuilt.push_str(&params.encode());
    }
    rebuilt
}

/// `scheme://host[:port]/path` for absolute targets, the bare path otherwise.
fn base_of(target: &str) -> String {
    match Url::parse(target) {
        Ok(url) if url.has_host() => {
            let mut base = format!("{}://", url.scheme());
            base.push_str(url.host_str().unwrap_or_default());
            if let Some(port) = url.port() {
                base.push(':');
                base.push_str(&port.to_string());
            }
            base.push_str(url.path());
            base
        }
        _ => target.to_string(),
    }
}
