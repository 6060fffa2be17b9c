//! HTTP client for the export rendering API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy, header, redirect::Policy};
use tracing::debug;

use crate::{
    application::upstream::{
        EXPORT_HOST_HEADER, EXPORT_PATH_HEADER, EXPORT_SOURCE_EMBED, EXPORT_SOURCE_HEADER,
        RenderApi, TransportError, UpstreamReply, UpstreamRequest,
    },
    domain::session::ProxyConfig,
};

use super::error::InfraError;

/// Timeouts and routing for outbound calls.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone)]
pub struct ReqwestRenderApi {
    client: Client,
}

impl ReqwestRenderApi {
    pub fn new(options: &ClientOptions) -> Result<Self, InfraError> {
        let mut builder = Client::builder()
            .user_agent(Self::user_agent())
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .http1_only()
            .redirect(Policy::none());

        if let Some(proxy) = options.proxy.as_ref() {
            builder = builder.proxy(build_proxy(proxy)?);
        }

        let client = builder
            .build()
            .map_err(|err| InfraError::http_client(format!("failed to build client: {err}")))?;

        Ok(Self { client })
    }

    pub fn user_agent() -> &'static str {
        concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION"),
            " reqwest/",
            env!("EMBED_RELAY_REQWEST_VERSION"),
            " rustc/",
            env!("EMBED_RELAY_RUSTC_VERSION")
        )
    }
}

fn build_proxy(config: &ProxyConfig) -> Result<Proxy, InfraError> {
    let url = config.url();
    let proxy = Proxy::all(url.as_str())
        .map_err(|err| InfraError::http_client(format!("invalid proxy `{url}`: {err}")))?;

    Ok(match config.credentials() {
        Some(credentials) => proxy.basic_auth(&credentials.login, &credentials.password),
        None => proxy,
    })
}

#[async_trait]
impl RenderApi for ReqwestRenderApi {
    async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamReply, TransportError> {
        let mut call = self.client.get(request.url.clone());

        if let Some(cookie) = request.cookie.as_deref() {
            call = call.header(header::COOKIE, cookie);
        }
        if let Some(attribution) = request.attribution.as_ref() {
            call = call
                .header(EXPORT_SOURCE_HEADER, EXPORT_SOURCE_EMBED)
                .header(EXPORT_HOST_HEADER, attribution.host.as_str())
                .header(EXPORT_PATH_HEADER, attribution.path.as_str());
        }

        let response = call.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        debug!(
            target = "embed_relay::infra::upstream",
            status,
            bytes = body.len(),
            "export API answered"
        );

        Ok(UpstreamReply { status, body })
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    let code = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_redirect() {
        "redirect"
    } else if err.is_body() {
        "body"
    } else if err.is_decode() {
        "decode"
    } else if err.is_builder() {
        "builder"
    } else {
        "request"
    };

    TransportError::new(code, error_chain(&err))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(inner) = current {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        current = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_the_relay() {
        let agent = ReqwestRenderApi::user_agent();
        assert!(agent.starts_with(concat!("embed-relay/", env!("CARGO_PKG_VERSION"))));
        assert!(agent.contains(" reqwest/"));
        assert!(!agent.contains(" reqwest/unknown"));
        assert!(agent.contains(" rustc/"));
    }

    #[test]
    fn proxy_with_credentials_builds() {
        let proxy = ProxyConfig::from_parts(Some("10.0.0.1"), Some("8080"), Some("u"), Some("p"))
            .expect("proxy");
        let options = ClientOptions {
            connect_timeout: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            proxy: Some(proxy),
        };
        assert!(ReqwestRenderApi::new(&options).is_ok());
    }

    #[test]
    fn error_chain_joins_sources() {
        let inner = std::io::Error::other("refused");
        let outer = InfraError::from(inner);
        assert!(error_chain(&outer).ends_with("refused"));
    }
}
