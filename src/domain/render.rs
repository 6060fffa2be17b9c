//! Export API payloads and the terminal outcomes of a relay invocation.

use serde::Deserialize;

/// Visitor cookie holding the tracking id issued by the export API.
pub const TRACKING_COOKIE: &str = "tid";
/// Cookie name the export API expects the tracking id under.
pub const UPSTREAM_TRACKER_COOKIE: &str = "stg-tracker";
/// Default lifetime of the tracking cookie: 30 days.
pub const DEFAULT_TRACKING_MAX_AGE_SECS: u64 = 2_592_000;

/// Successful render payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenderPayload {
    pub content: String,
    pub tid: String,
}

/// Redirect signal sent alongside a 301/302.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedirectPayload {
    pub redirect: String,
}

/// A rewritten landing page ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Upstream status (2xx or 404).
    pub status: u16,
    pub html: String,
    /// Tracking id to persist in the visitor's cookie.
    pub tid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rendered(RenderedPage),
    Redirected { location: String },
    /// Upstream answered with a status the relay does not interpret; body is untouched.
    Passthrough { status: u16, body: String },
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Rendered(_) => "rendered",
            Outcome::Redirected { .. } => "redirected",
            Outcome::Passthrough { .. } => "passthrough",
        }
    }
}
