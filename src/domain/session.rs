//! Per-process export session: which export to render and how to reach the API.

use super::error::DomainError;

/// Immutable configuration shared by every relay invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSession {
    endpoint: String,
    export_hash: String,
    proxy: Option<ProxyConfig>,
}

impl ExportSession {
    /// Build a session; the endpoint loses any trailing slash so paths can be appended verbatim.
    pub fn new(
        endpoint: &str,
        export_hash: &str,
        proxy: Option<ProxyConfig>,
    ) -> Result<Self, DomainError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(DomainError::validation("export endpoint must not be empty"));
        }

        let export_hash = export_hash.trim();
        if export_hash.is_empty() {
            return Err(DomainError::validation("export hash must not be empty"));
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            export_hash: export_hash.to_string(),
            proxy,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn export_hash(&self) -> &str {
        &self.export_hash
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }
}

/// Upstream HTTP proxy the render call is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    address: String,
    port: String,
    credentials: Option<ProxyCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub login: String,
    pub password: String,
}

impl ProxyConfig {
    /// Assemble a proxy from loosely configured parts.
    ///
    /// Returns `None` unless both address and port are non-empty. Credentials are
    /// attached only when login and password are both non-empty.
    pub fn from_parts(
        address: Option<&str>,
        port: Option<&str>,
        login: Option<&str>,
        password: Option<&str>,
    ) -> Option<Self> {
        let address = non_empty(address)?;
        let port = non_empty(port)?;

        let credentials = match (non_empty(login), non_empty(password)) {
            (Some(login), Some(password)) => Some(ProxyCredentials {
                login: login.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        };

        Some(Self {
            address: address.to_string(),
            port: port.to_string(),
            credentials,
        })
    }

    /// Proxy URL in `scheme://address:port` form; bare addresses default to `http`.
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            format!("{}:{}", self.address, self.port)
        } else {
            format!("http://{}:{}", self.address, self.port)
        }
    }

    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        self.credentials.as_ref()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
