//! Transport-specific connection profiles.

use std::time::Duration;

use fluxpool_client::{
    BatchPoints, Client, ClientError, HttpClient, HttpConfig, Pong, Query, Response, UdpClient,
    UdpConfig,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connector::Connector;

/// Connection profile used to construct pooled clients.
///
/// Transport is chosen once, so a pool never mixes HTTP and UDP clients.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase", tag = "transport")]
pub enum ConnectionProfile {
    /// HTTP transport, supports both writes and queries.
    Http(HttpConfig),
    /// UDP transport, supports writes only.
    Udp(UdpConfig),
}

impl ConnectionProfile {
    /// Short transport name.
    #[must_use]
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Udp(_) => "udp",
        }
    }
}

impl From<HttpConfig> for ConnectionProfile {
    fn from(value: HttpConfig) -> Self {
        Self::Http(value)
    }
}

impl From<UdpConfig> for ConnectionProfile {
    fn from(value: UdpConfig) -> Self {
        Self::Udp(value)
    }
}

/// Client constructed from a [`ConnectionProfile`].
#[derive(Debug)]
#[non_exhaustive]
pub enum InfluxClient {
    /// HTTP client.
    Http(HttpClient),
    /// UDP client.
    Udp(UdpClient),
}

#[async_trait::async_trait]
impl Client for InfluxClient {
    type Error = ClientError;

    async fn ping(&self, timeout: Duration) -> Result<Pong, ClientError> {
        match self {
            Self::Http(client) => client.ping(timeout).await,
            Self::Udp(client) => client.ping(timeout).await,
        }
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), ClientError> {
        match self {
            Self::Http(client) => client.write(batch).await,
            Self::Udp(client) => client.write(batch).await,
        }
    }

    async fn query(&self, query: &Query) -> Result<Response, ClientError> {
        match self {
            Self::Http(client) => client.query(query).await,
            Self::Udp(client) => client.query(query).await,
        }
    }

    fn close(self) {
        match self {
            Self::Http(client) => client.close(),
            Self::Udp(client) => client.close(),
        }
    }
}

#[async_trait::async_trait]
impl Connector for ConnectionProfile {
    type Client = InfluxClient;

    async fn connect(&self) -> Result<InfluxClient, ClientError> {
        let client = match self {
            Self::Http(cfg) => InfluxClient::Http(HttpClient::new(cfg)?),
            Self::Udp(cfg) => InfluxClient::Udp(UdpClient::connect(cfg).await?),
        };
        debug!(transport = self.transport(), "constructed client");
        Ok(client)
    }
}
