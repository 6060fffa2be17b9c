use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode, header::LOCATION},
    middleware,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

use crate::{
    application::{error::HttpError, relay::EmbedRelay},
    domain::render::{Outcome, RenderedPage, TRACKING_COOKIE},
};

use super::{
    inbound::inbound_request,
    middleware::{log_responses, set_request_context},
};

const MAX_FORM_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub relay: Arc<EmbedRelay>,
    pub cookie_max_age: Duration,
    pub assume_https: bool,
}

/// Every path and method lands on the relay; the export decides what to show.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .fallback(relay_landing)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn relay_landing(
    State(state): State<HttpState>,
    jar: CookieJar,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_FORM_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            return HttpError::from_error(
                "infra::http::public::body",
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
                &err,
            )
            .into_response();
        }
    };

    let inbound = inbound_request(&parts.uri, &parts.headers, &jar, &body, state.assume_https);
    debug!(
        target = "embed_relay::http::public",
        method = %parts.method,
        uri = %parts.uri,
        params = inbound.params.iter().count(),
        "relaying landing request"
    );

    match state.relay.render(&inbound).await {
        Ok(outcome) => outcome_response(outcome, jar, state.cookie_max_age),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Map a terminal outcome onto exactly one response.
pub fn outcome_response(outcome: Outcome, jar: CookieJar, cookie_max_age: Duration) -> Response {
    match outcome {
        Outcome::Rendered(RenderedPage { status, html, tid }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let jar = jar.add(tracking_cookie(tid, cookie_max_age));
            (status, jar, Html(html)).into_response()
        }
        Outcome::Redirected { location } => {
            match axum::http::HeaderValue::try_from(location.as_str()) {
                Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
                Err(err) => HttpError::from_error(
                    "infra::http::public::redirect",
                    StatusCode::BAD_GATEWAY,
                    "Export API returned an invalid redirect",
                    &err,
                )
                .into_response(),
            }
        }
        Outcome::Passthrough { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Html(body)).into_response()
        }
    }
}

pub fn tracking_cookie(tid: String, max_age: Duration) -> Cookie<'static> {
    let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((TRACKING_COOKIE, tid))
        .path("/")
        .max_age(time::Duration::seconds(seconds))
        .build()
}
