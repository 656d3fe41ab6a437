//! HTTP client - configuration.

use std::time::Duration;

use reqwest::{ClientBuilder, Proxy};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ClientError;

/// HTTP client configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct HttpConfig {
    /// Server URL, e.g. `http://localhost:8086`.
    #[serde(alias = "url")]
    pub addr: Url,
    /// User name for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "user")]
    pub username: Option<String>,
    /// Password for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Override `User-Agent` header value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Total request timeout.
    ///
    /// Default is no timeout.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub timeout: Option<Duration>,
    /// Timeout for only the connect phase of a request.
    ///
    /// Default is no timeout.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub connect_timeout: Option<Duration>,
    /// Skip verification of server TLS certificates.
    ///
    /// Default is `false`.
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Proxy to send all requests through.
    ///
    /// Proxy settings from environment variables are not used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Url>,
    /// TCP-level configuration.
    #[serde(default)]
    pub tcp: HttpTcpConfig,
}

impl HttpConfig {
    /// Configuration with default settings for a server URL.
    #[must_use]
    pub fn new(addr: Url) -> Self {
        Self {
            addr,
            username: None,
            password: None,
            user_agent: None,
            timeout: None,
            connect_timeout: None,
            insecure_skip_verify: false,
            proxy: None,
            tcp: HttpTcpConfig::default(),
        }
    }

    /// Set basic authentication credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl ToString, password: impl ToString) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set total request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value for `User-Agent` header.
    #[must_use]
    fn user_agent(&self) -> String {
        const PRODUCT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        match &self.user_agent {
            Some(ua) => [ua.as_str(), PRODUCT].join(" "),
            None => PRODUCT.into(),
        }
    }

    /// Create [`reqwest::ClientBuilder`] from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if URL scheme is not `http` or `https`, or if proxy configuration is invalid.
    pub fn to_client_builder(&self) -> Result<ClientBuilder, ClientError> {
        match self.addr.scheme() {
            "http" | "https" => {}
            other => return Err(ClientError::UnsupportedScheme(other.into())),
        }
        let mut builder = ClientBuilder::new()
            .use_rustls_tls()
            .danger_accept_invalid_certs(self.insecure_skip_verify)
            .user_agent(self.user_agent())
            .tcp_nodelay(self.tcp.nodelay)
            .tcp_keepalive(self.tcp.keepalive);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        builder = match &self.proxy {
            Some(proxy) => builder.proxy(Proxy::all(proxy.as_str())?),
            None => builder.no_proxy(),
        };
        Ok(builder)
    }
}

/// TCP-level configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct HttpTcpConfig {
    /// Set whether sockets have `TCP_NODELAY` enabled.
    ///
    /// Default is `true`.
    #[serde(default = "default_true")]
    pub nodelay: bool,
    /// Set `SO_KEEPALIVE` option for all sockets with the supplied duration.
    ///
    /// If `None`, the option will not be set.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub keepalive: Option<Duration>,
}

impl Default for HttpTcpConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: None,
        }
    }
}

#[must_use]
#[inline]
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let cfg: HttpConfig = serde_json::from_value(json!({
            "url": "http://db.local:8086",
            "user": "writer",
            "password": "secret",
            "timeout": "5s"
        }))
        .unwrap();
        assert_eq!(cfg.addr.as_str(), "http://db.local:8086/");
        assert_eq!(cfg.username.as_deref(), Some("writer"));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(5)));
        assert!(cfg.tcp.nodelay);
        assert!(!cfg.insecure_skip_verify);
    }

    #[test]
    fn reject_non_http_scheme() {
        let cfg = HttpConfig::new(Url::parse("ftp://db.local").unwrap());
        assert!(matches!(
            cfg.to_client_builder(),
            Err(ClientError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn user_agent_includes_product() {
        let mut cfg = HttpConfig::new(Url::parse("http://db.local").unwrap());
        assert!(cfg.user_agent().starts_with("fluxpool-client/"));
        cfg.user_agent = Some("collector/2.1".into());
        assert!(cfg.user_agent().starts_with("collector/2.1 fluxpool-client/"));
    }
}
