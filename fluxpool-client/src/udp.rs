//! UDP transport.
//!
//! Write-only: points are sent as line protocol datagrams, with no acknowledgement from the
//! server.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::net::{lookup_host, UdpSocket};
use tracing::trace;

use crate::{
    client::{Client, Pong},
    error::ClientError,
    point::BatchPoints,
    query::{Query, Response},
};

/// UDP client configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct UdpConfig {
    /// Server address in `host:port` form.
    pub addr: String,
    /// Maximum datagram payload size, in bytes.
    ///
    /// Default is 512.
    #[serde(default = "UdpConfig::default_payload_size")]
    pub payload_size: usize,
}

impl UdpConfig {
    /// Configuration with default payload size for a server address.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            payload_size: Self::default_payload_size(),
        }
    }

    /// Default value for [`Self::payload_size`].
    #[must_use]
    #[inline]
    fn default_payload_size() -> usize {
        512
    }
}

/// UDP client.
#[derive(Debug)]
pub struct UdpClient {
    socket: UdpSocket,
    payload_size: usize,
}

impl UdpClient {
    /// Bind a local socket and connect it to the configured server.
    ///
    /// # Errors
    ///
    /// Returns `Err` if server address cannot be resolved, or a socket cannot be opened.
    pub async fn connect(config: &UdpConfig) -> Result<Self, ClientError> {
        let target = lookup_host(config.addr.as_str())
            .await?
            .next()
            .ok_or_else(|| ClientError::InvalidAddress(config.addr.clone()))?;
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        Ok(Self {
            socket,
            payload_size: config.payload_size.max(1),
        })
    }

    /// Server address this client sends to.
    ///
    /// # Errors
    ///
    /// Returns `Err` if socket has no peer address.
    pub fn peer_addr(&self) -> Result<SocketAddr, ClientError> {
        self.socket.peer_addr().map_err(Into::into)
    }

    async fn send(&self, payload: &str) -> Result<(), ClientError> {
        trace!(bytes = payload.len(), "sending datagram");
        self.socket.send(payload.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Client for UdpClient {
    type Error = ClientError;

    /// Always succeeds, as there is no way to probe a UDP listener.
    async fn ping(&self, _timeout: Duration) -> Result<Pong, ClientError> {
        Ok(Pong::default())
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), ClientError> {
        let mut payload = String::with_capacity(self.payload_size);
        // Datagram listeners always parse timestamps as nanoseconds.
        for line in batch.lines_in_nanos() {
            if !payload.is_empty() && payload.len() + line.len() + 1 >= self.payload_size {
                self.send(&payload).await?;
                payload.clear();
            }
            payload.push_str(&line);
            payload.push('\n');
        }
        if !payload.is_empty() {
            self.send(&payload).await?;
        }
        Ok(())
    }

    async fn query(&self, _query: &Query) -> Result<Response, ClientError> {
        Err(ClientError::QueryUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use super::*;
    use crate::point::{Point, Precision};

    async fn listener() -> (UdpSocket, String) {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap().to_string();
        (sock, addr)
    }

    async fn recv(sock: &UdpSocket) -> String {
        let mut buf = vec![0u8; 4096];
        let len = tokio::time::timeout(Duration::from_secs(2), sock.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    fn batch(count: usize) -> BatchPoints {
        let mut batch = BatchPoints::new("telemetry").with_precision(Precision::Seconds);
        for i in 0..count {
            batch.push(
                Point::builder("load")
                    .tag("idx", i.to_string())
                    .field("value", i as i64)
                    .build()
                    .unwrap(),
            );
        }
        batch
    }

    #[tokio::test]
    async fn small_batch_fits_one_datagram() {
        let (sock, addr) = listener().await;
        let client = UdpClient::connect(&UdpConfig::new(addr)).await.unwrap();
        client.write(&batch(3)).await.unwrap();
        assert_eq!(
            recv(&sock).await,
            "load,idx=0 value=0i\nload,idx=1 value=1i\nload,idx=2 value=2i\n"
        );
    }

    #[tokio::test]
    async fn large_batch_is_split() {
        let (sock, addr) = listener().await;
        let mut cfg = UdpConfig::new(addr);
        // Each line is 20 bytes with its newline; two fit in 45 bytes.
        cfg.payload_size = 45;
        let client = UdpClient::connect(&cfg).await.unwrap();
        client.write(&batch(5)).await.unwrap();
        assert_eq!(recv(&sock).await, "load,idx=0 value=0i\nload,idx=1 value=1i\n");
        assert_eq!(recv(&sock).await, "load,idx=2 value=2i\nload,idx=3 value=3i\n");
        assert_eq!(recv(&sock).await, "load,idx=4 value=4i\n");
    }

    #[tokio::test]
    async fn full_payload_is_never_sent() {
        let (sock, addr) = listener().await;
        let mut cfg = UdpConfig::new(addr);
        // Two 20-byte lines would exactly fill the payload.
        cfg.payload_size = 40;
        let client = UdpClient::connect(&cfg).await.unwrap();
        client.write(&batch(2)).await.unwrap();
        assert_eq!(recv(&sock).await, "load,idx=0 value=0i\n");
        assert_eq!(recv(&sock).await, "load,idx=1 value=1i\n");
    }

    #[tokio::test]
    async fn timestamps_are_sent_in_nanoseconds() {
        let (sock, addr) = listener().await;
        let client = UdpClient::connect(&UdpConfig::new(addr)).await.unwrap();
        let mut batch = BatchPoints::new("telemetry").with_precision(Precision::Seconds);
        batch.push(
            Point::builder("m")
                .field("v", 1i64)
                .time(UNIX_EPOCH + Duration::from_secs(10))
                .build()
                .unwrap(),
        );
        client.write(&batch).await.unwrap();
        assert_eq!(recv(&sock).await, "m v=1i 10000000000\n");
    }

    #[tokio::test]
    async fn ping_always_succeeds_and_query_is_unsupported() {
        let (_sock, addr) = listener().await;
        let client = UdpClient::connect(&UdpConfig::new(addr)).await.unwrap();
        assert_eq!(client.ping(Duration::from_millis(100)).await.unwrap(), Pong::default());
        assert!(matches!(
            client.query(&Query::new("SHOW DATABASES", "")).await,
            Err(ClientError::QueryUnsupported)
        ));
    }

    #[tokio::test]
    async fn unresolvable_address_fails() {
        assert!(UdpClient::connect(&UdpConfig::new("not an address")).await.is_err());
    }
}
