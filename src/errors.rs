//! Error types and error support code.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::{
    connector::{ClientErrorOf, Connector},
    pool::ClientPool,
};

/// Error type used by pool operations.
///
/// `E` is the error type of the pooled client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError<E>
where
    E: std::error::Error + 'static,
{
    /// A new client could not be constructed.
    #[error("Unable to construct client: {0}")]
    Connect(#[source] E),
    /// A newly constructed client failed its liveness probe.
    #[error("Client failed liveness probe: {0}")]
    Probe(#[source] E),
    /// A newly constructed client did not answer its liveness probe in time.
    #[error("Client liveness probe timed out after {0:?}")]
    ProbeTimeout(Duration),
    /// Client write or query operation failed.
    #[error("Client operation failed: {0}")]
    Operation(#[source] E),
    /// No client became available within acquisition timeout.
    #[error("Timed out waiting for a pooled client")]
    AcquireTimeout,
    /// Pool was closed.
    #[error("Pool is closed")]
    Closed,
}

impl<E> PoolError<E>
where
    E: std::error::Error + 'static,
{
    /// Underlying client error, if any.
    #[must_use]
    pub fn client_error(&self) -> Option<&E> {
        match self {
            Self::Connect(err) | Self::Probe(err) | Self::Operation(err) => Some(err),
            Self::ProbeTimeout(_) | Self::AcquireTimeout | Self::Closed => None,
        }
    }
}

/// Error returned when a pool could not be filled up to its capacity on creation.
///
/// The pool is still usable, but holds no idle clients: all clients constructed before the
/// failure were closed. Use [`PrefillError::into_pool`] to recover it.
pub struct PrefillError<C: Connector> {
    pool: ClientPool<C>,
    source: ClientErrorOf<C>,
    constructed: usize,
}

impl<C: Connector> PrefillError<C> {
    pub(crate) fn new(pool: ClientPool<C>, source: ClientErrorOf<C>, constructed: usize) -> Self {
        Self {
            pool,
            source,
            constructed,
        }
    }

    /// Number of clients successfully constructed (and then discarded) before the failure.
    #[must_use]
    pub fn constructed(&self) -> usize {
        self.constructed
    }

    /// Client error that interrupted prefilling.
    #[must_use]
    pub fn client_error(&self) -> &ClientErrorOf<C> {
        &self.source
    }

    /// Recover the degraded pool, discarding the error.
    #[must_use]
    pub fn into_pool(self) -> ClientPool<C> {
        self.pool
    }

    /// Split into the degraded pool and client error.
    #[must_use]
    pub fn into_parts(self) -> (ClientPool<C>, ClientErrorOf<C>) {
        (self.pool, self.source)
    }
}

impl<C: Connector> fmt::Debug for PrefillError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefillError")
            .field("pool", &self.pool.name())
            .field("source", &self.source)
            .field("constructed", &self.constructed)
            .finish()
    }
}

impl<C: Connector> fmt::Display for PrefillError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unable to prefill pool {} ({} of {} clients constructed): {}",
            self.pool.name(),
            self.constructed,
            self.pool.capacity(),
            self.source
        )
    }
}

impl<C: Connector> std::error::Error for PrefillError<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
