//! Common client interface.

use std::time::Duration;

use crate::{point::BatchPoints, query::Query, query::Response};

/// Result of a successful liveness probe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pong {
    /// Round-trip time of the probe.
    pub rtt: Duration,
    /// Server version, if reported.
    pub version: String,
}

/// Time-series database client.
///
/// Implemented by every transport. Clients are used by a single caller at a time, but must be
/// movable between tasks.
#[async_trait::async_trait]
pub trait Client: Send + Sync {
    /// Error type produced by this client.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Check that the server is reachable, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the server did not answer in time or answered with an error.
    async fn ping(&self, timeout: Duration) -> Result<Pong, Self::Error>;

    /// Write a batch of points.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the batch could not be sent or was rejected by the server.
    async fn write(&self, batch: &BatchPoints) -> Result<(), Self::Error>;

    /// Run a query.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the query could not be sent, or the response could not be decoded.
    async fn query(&self, query: &Query) -> Result<Response, Self::Error>;

    /// Release any resources held by this client.
    fn close(self)
    where
        Self: Sized,
    {
    }
}
