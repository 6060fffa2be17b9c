//! The embed relay: one inbound request in, one terminal outcome out.

use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    inbound::InboundRequest,
    render::{Outcome, RedirectPayload, RenderPayload, RenderedPage},
    session::ExportSession,
};

use super::{
    redirect::unset_export_param,
    rewrite::{RewriteContext, rewrite_landing},
    upstream::{self, RenderApi, TransportError, UpstreamReply},
};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("export API answered {status} with a malformed render payload: {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid render URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RelayError {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Transport(_) => "transport",
            RelayError::Decode { .. } => "decode",
            RelayError::InvalidUrl(_) => "invalid_url",
        }
    }
}

pub struct EmbedRelay {
    session: ExportSession,
    api: Arc<dyn RenderApi>,
}

impl EmbedRelay {
    pub fn new(session: ExportSession, api: Arc<dyn RenderApi>) -> Self {
        Self { session, api }
    }

    /// Fetch the landing page for `inbound` and turn the answer into a terminal outcome.
    ///
    /// Transport failures and malformed render payloads abort the invocation; nothing
    /// is retried.
    pub async fn render(&self, inbound: &InboundRequest) -> Result<Outcome, RelayError> {
        let result = self.render_inner(inbound).await;

        let label = match &result {
            Ok(outcome) => outcome.kind(),
            Err(err) => {
                debug!(target = "embed_relay::relay", kind = err.kind(), "relay failed");
                "failed"
            }
        };
        counter!("embed_relay_outcome_total", "outcome" => label).increment(1);

        result
    }

    async fn render_inner(&self, inbound: &InboundRequest) -> Result<Outcome, RelayError> {
        let request = upstream::build_request(&self.session, inbound)?;
        debug!(
            target = "embed_relay::relay",
            url = %request.url,
            has_cookie = request.cookie.is_some(),
            attributed = request.attribution.is_some(),
            "fetching landing page"
        );

        let started = Instant::now();
        let reply = self.api.fetch(&request).await;
        histogram!("embed_relay_upstream_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        let reply = reply.inspect_err(|err| {
            warn!(
                target = "embed_relay::relay",
                code = err.code,
                error = %err.message,
                "export API unreachable"
            );
        })?;

        interpret_reply(&self.session, reply, inbound)
    }
}

/// Branch on the upstream status: redirect, render-and-rewrite, or pass the body through.
pub fn interpret_reply(
    session: &ExportSession,
    reply: UpstreamReply,
    inbound: &InboundRequest,
) -> Result<Outcome, RelayError> {
    let UpstreamReply { status, body } = reply;

    match status {
        301 | 302 => match serde_json::from_str::<RedirectPayload>(&body) {
            Ok(payload) => Ok(Outcome::Redirected {
                location: unset_export_param(&payload.redirect, &inbound.params),
            }),
            Err(err) => {
                debug!(
                    target = "embed_relay::relay",
                    status,
                    error = %err,
                    "redirect without a usable payload; passing body through"
                );
                Ok(Outcome::Passthrough { status, body })
            }
        },
        404 | 200..=299 => {
            let payload: RenderPayload = serde_json::from_str(&body)
                .map_err(|source| RelayError::Decode { status, source })?;

            let actual_link = inbound.actual_link();
            let ctx = RewriteContext {
                endpoint: session.endpoint(),
                export_hash: session.export_hash(),
                tid: &payload.tid,
                actual_link: &actual_link,
            };
            let html = rewrite_landing(&payload.content, &ctx);

            Ok(Outcome::Rendered(RenderedPage {
                status,
                html,
                tid: payload.tid,
            }))
        }
        _ => Ok(Outcome::Passthrough { status, body }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::upstream::UpstreamRequest;

    struct StubApi {
        reply: Result<UpstreamReply, TransportError>,
        seen: Mutex<Vec<UpstreamRequest>>,
    }

    impl StubApi {
        fn replying(status: u16, body: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(UpstreamReply {
                    status,
                    body: body.into(),
                }),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: TransportError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RenderApi for StubApi {
        async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamReply, TransportError> {
            self.seen.lock().expect("lock").push(request.clone());
            self.reply.clone()
        }
    }

    fn session() -> ExportSession {
        ExportSession::new("https://export.test", "H", None).expect("session")
    }

    fn inbound() -> InboundRequest {
        InboundRequest {
            host: Some("shop.test".to_string()),
            request_uri: "/offer".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn success_payload_is_rewritten_and_carries_tid() {
        let body = json!({
            "content": r#"<head></head><form action="/submit"></form>"#,
            "tid": "T1",
        });
        let api = StubApi::replying(200, body.to_string());
        let relay = EmbedRelay::new(session(), api.clone());

        let page = match relay.render(&inbound()).await.expect("outcome") {
            Outcome::Rendered(page) => page,
            other => panic!("expected rendered outcome, got {other:?}"),
        };
        assert_eq!(page.status, 200);
        assert_eq!(page.tid, "T1");
        assert!(page.html.contains(
            r#"action="https://export.test/submit?export_hash=H&tid=T1""#
        ));
        assert!(page.html.contains("redirectUrl: 'http://shop.test/offer'"));

        let seen = api.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url.query(), Some("export_hash=H"));
    }

    #[tokio::test]
    async fn not_found_payload_is_rendered_too() {
        let body = json!({ "content": "<p>gone</p>", "tid": "T2" });
        let relay = EmbedRelay::new(session(), StubApi::replying(404, body.to_string()));

        match relay.render(&inbound()).await.expect("outcome") {
            Outcome::Rendered(page) => {
                assert_eq!(page.status, 404);
                assert_eq!(page.html, "<p>gone</p>");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn redirect_payload_rebuilds_target_from_inbound_params() {
        let body = json!({ "redirect": "https://x.test/p?tid=Z&export_hash=H" });
        let relay = EmbedRelay::new(session(), StubApi::replying(301, body.to_string()));

        let outcome = relay.render(&inbound()).await.expect("outcome");
        assert_eq!(
            outcome,
            Outcome::Redirected {
                location: "https://x.test/p".to_string()
            }
        );
    }

    #[tokio::test]
    async fn conversion_hash_reaches_upstream_and_redirect() {
        let body = json!({ "redirect": "https://x.test/thanks?export_hash=H" });
        let api = StubApi::replying(302, body.to_string());
        let relay = EmbedRelay::new(session(), api.clone());
        let mut request = inbound();
        request.params.insert("hash", "C9");

        let outcome = relay.render(&request).await.expect("outcome");

        assert_eq!(
            outcome,
            Outcome::Redirected {
                location: "https://x.test/thanks?hash=C9".to_string()
            }
        );
        let seen = api.seen.lock().expect("lock");
        assert_eq!(
            seen[0].url.query(),
            Some("conversion_hash=C9&export_hash=H")
        );
    }

    #[tokio::test]
    async fn redirect_status_without_payload_passes_through() {
        let relay = EmbedRelay::new(session(), StubApi::replying(302, "moved"));

        let outcome = relay.render(&inbound()).await.expect("outcome");
        assert_eq!(
            outcome,
            Outcome::Passthrough {
                status: 302,
                body: "moved".to_string()
            }
        );
    }

    #[tokio::test]
    async fn other_statuses_pass_body_through_untouched() {
        let body = r#"<form action="/submit"></form>"#;
        let relay = EmbedRelay::new(session(), StubApi::replying(500, body));

        let outcome = relay.render(&inbound()).await.expect("outcome");
        assert_eq!(
            outcome,
            Outcome::Passthrough {
                status: 500,
                body: body.to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_success_payload_is_a_decode_error() {
        let relay = EmbedRelay::new(session(), StubApi::replying(200, "<html>not json</html>"));

        let err = relay.render(&inbound()).await.unwrap_err();
        assert!(matches!(err, RelayError::Decode { status: 200, .. }));
        assert_eq!(err.kind(), "decode");
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let relay = EmbedRelay::new(
            session(),
            StubApi::failing(TransportError::new("connect", "dns error: no such host")),
        );

        let err = relay.render(&inbound()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "check upstream settings: connect dns error: no such host"
        );
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
