//! Checked out clients and slot reservations.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Instant,
};

use fluxpool_client::Client;
use tracing::{debug_span, Instrument};

use crate::{connector::Connector, pool::PoolInner};

/// Reserved pool slot.
///
/// Frees the slot when dropped, unless disarmed. Keeps accounting intact if a future holding
/// the reservation is cancelled.
pub(super) struct SlotGuard<'p, C: Connector> {
    pool: &'p PoolInner<C>,
    armed: bool,
}

impl<'p, C: Connector> SlotGuard<'p, C> {
    pub(super) fn new(pool: &'p PoolInner<C>) -> Self {
        Self { pool, armed: true }
    }

    /// Keep the slot reserved after the guard is gone.
    pub(super) fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C: Connector> Drop for SlotGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.free_slot();
        }
    }
}

/// Client checked out from a pool.
///
/// Dereferences to the underlying client. Should be returned via [`PooledClient::release`];
/// if dropped instead, the client is returned in a background task.
pub struct PooledClient<C: Connector> {
    pool: Arc<PoolInner<C>>,
    /// Always `Some` until returned.
    client: Option<C::Client>,
    taken_at: Instant,
}

impl<C: Connector> PooledClient<C> {
    pub(super) fn new(pool: Arc<PoolInner<C>>, client: C::Client) -> Self {
        Self {
            pool,
            client: Some(client),
            taken_at: Instant::now(),
        }
    }

    /// Name of the originating pool.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }

    /// Return client to the originating pool.
    ///
    /// The client is probed first. Live clients are put back into the idle buffer, dead ones are
    /// closed. Either way, the slot held by this client is freed.
    pub async fn release(mut self) {
        if let Some(client) = self.client.take() {
            let span = debug_span!("pool_release", pool = %self.pool.name);
            self.pool
                .check_in(client, self.taken_at)
                .instrument(span)
                .await;
        }
    }
}

impl<C: Connector> Deref for PooledClient<C> {
    type Target = C::Client;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref().expect("pooled client is present until released")
    }
}

impl<C: Connector> DerefMut for PooledClient<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client.as_mut().expect("pooled client is present until released")
    }
}

impl<C: Connector> AsRef<C::Client> for PooledClient<C> {
    fn as_ref(&self) -> &C::Client {
        self
    }
}

impl<C: Connector> fmt::Debug for PooledClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledClient")
            .field("pool", &self.pool.name)
            .field("held_for", &self.taken_at.elapsed())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for PooledClient<C> {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let deferred = DeferredReturn {
            pool: self.pool.clone(),
            client: Some(client),
            taken_at: self.taken_at,
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(deferred.run());
        }
    }
}

/// Return of a dropped client, performed in a background task.
///
/// If the task never runs, the slot is freed and the client is closed when this is dropped.
struct DeferredReturn<C: Connector> {
    pool: Arc<PoolInner<C>>,
    client: Option<C::Client>,
    taken_at: Instant,
}

impl<C: Connector> DeferredReturn<C> {
    async fn run(mut self) {
        if let Some(client) = self.client.take() {
            self.pool.check_in(client, self.taken_at).await;
        }
    }
}

impl<C: Connector> Drop for DeferredReturn<C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            // Client can't be verified without a runtime.
            self.pool.free_slot();
            client.close();
        }
    }
}
