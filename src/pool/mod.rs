//! Bounded, health-checked client pool.
//!
//! All accounting (idle buffer, number of checked out clients, closed flag) lives behind a single
//! mutex, so admission checks and buffer updates happen atomically. Network I/O is never performed
//! while the mutex is held.
//!
//! A slot is reserved for a client for the whole time it is outside of the idle buffer,
//! including the time spent on construction and liveness probes. This keeps the number of
//! existing clients within pool capacity at all times.

mod guard;

use std::{
    collections::VecDeque,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use fluxpool_client::{BatchPoints, Client, Query, Response};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::{debug, debug_span, info, trace, warn, Instrument};

pub use self::guard::PooledClient;
use self::guard::SlotGuard;
use crate::{
    config::{PoolConfig, PoolOptions},
    connector::{ClientErrorOf, Connector},
    errors::{PoolError, PrefillError},
    metrics::{operation_kv, pool_kv, Metrics, PoolState, POOL_METRICS},
    profile::ConnectionProfile,
};

/// Name used for pools without explicitly configured name.
const DEFAULT_POOL_NAME: &str = "default";

/// Pool accounting, guarded by a mutex.
struct Accounting<T> {
    /// Free list of clients ready for use.
    idle: VecDeque<T>,
    /// Number of reserved slots: checked out clients, plus clients being constructed or probed.
    active: usize,
    /// Pool was closed, no new checkouts allowed.
    closed: bool,
}

/// Outcome of a single checkout attempt.
enum Checkout<T> {
    /// Got an idle client, slot is reserved.
    Idle(T),
    /// No idle clients, but there is room for a new one; slot is reserved.
    Admitted,
    /// Pool is at capacity.
    Exhausted,
    /// Pool is closed.
    Closed,
}

/// Shared pool state.
pub(crate) struct PoolInner<C: Connector> {
    name: String,
    label: [KeyValue; 1],
    metrics: Arc<Metrics>,
    options: PoolOptions,
    connector: C,
    state: Mutex<Accounting<C::Client>>,
}

impl<C: Connector> PoolInner<C> {
    fn checkout(&self) -> Checkout<C::Client> {
        let mut state = self.state.lock();
        if state.closed {
            return Checkout::Closed;
        }
        if let Some(client) = state.idle.pop_front() {
            state.active += 1;
            return Checkout::Idle(client);
        }
        if state.active + state.idle.len() < self.options.capacity.get() {
            state.active += 1;
            return Checkout::Admitted;
        }
        Checkout::Exhausted
    }

    /// Release a reserved slot without returning a client.
    pub(crate) fn free_slot(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
    }

    fn snapshot(&self) -> PoolState {
        let state = self.state.lock();
        PoolState {
            capacity: self.options.capacity.get(),
            idle: state.idle.len(),
            active: state.active,
        }
    }

    fn record_state(&self) {
        self.metrics.record_state(&self.label, self.snapshot());
    }

    async fn create(&self) -> Result<C::Client, ClientErrorOf<C>> {
        let started = Instant::now();
        let client = self.connector.connect().await?;
        self.metrics
            .create_time
            .record(started.elapsed().as_secs_f64(), &self.label);
        Ok(client)
    }

    async fn probe(&self, client: &C::Client) -> Result<(), PoolError<ClientErrorOf<C>>> {
        let timeout = self.options.probe_timeout;
        match tokio::time::timeout(timeout, client.ping(timeout)).await {
            Ok(Ok(pong)) => {
                trace!(rtt = ?pong.rtt, version = %pong.version, "liveness probe succeeded");
                Ok(())
            }
            Ok(Err(err)) => Err(PoolError::Probe(err)),
            Err(_) => Err(PoolError::ProbeTimeout(timeout)),
        }
    }

    async fn checkout_loop(&self) -> Result<C::Client, PoolError<ClientErrorOf<C>>> {
        loop {
            match self.checkout() {
                Checkout::Idle(client) => {
                    let slot = SlotGuard::new(self);
                    match self.probe(&client).await {
                        Ok(()) => {
                            slot.disarm();
                            return Ok(client);
                        }
                        Err(err) => {
                            warn!(pool = %self.name, error = %err, "evicting idle client");
                            client.close();
                        }
                    }
                }
                Checkout::Admitted => {
                    let slot = SlotGuard::new(self);
                    let client = self.create().await.map_err(|err| {
                        warn!(pool = %self.name, error = %err, "unable to construct client");
                        PoolError::Connect(err)
                    })?;
                    if let Err(err) = self.probe(&client).await {
                        warn!(pool = %self.name, error = %err, "new client failed liveness probe");
                        client.close();
                        return Err(err);
                    }
                    slot.disarm();
                    debug!(pool = %self.name, "constructed new client");
                    return Ok(client);
                }
                Checkout::Exhausted => {
                    trace!(pool = %self.name, "pool exhausted, waiting");
                    tokio::time::sleep(self.options.retry_interval).await;
                }
                Checkout::Closed => return Err(PoolError::Closed),
            }
        }
    }

    /// Return a checked out client.
    ///
    /// Client slot stays reserved until the liveness probe finishes.
    pub(crate) async fn check_in(&self, client: C::Client, taken_at: Instant) {
        let slot = SlotGuard::new(self);
        self.metrics
            .use_time
            .record(taken_at.elapsed().as_secs_f64(), &self.label);
        let alive = match self.probe(&client).await {
            Ok(()) => true,
            Err(err) => {
                warn!(pool = %self.name, error = %err, "discarding returned client");
                false
            }
        };
        slot.disarm();
        let rejected = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            if alive && !state.closed {
                state.idle.push_back(client);
                None
            } else {
                Some(client)
            }
        };
        if let Some(client) = rejected {
            client.close();
        }
        self.record_state();
    }
}

/// Bounded pool of reusable clients.
///
/// Cloning the pool is cheap, and all clones share the same clients.
pub struct ClientPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ClientPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for ClientPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPool")
            .field("name", &self.inner.name)
            .field("state", &self.inner.snapshot())
            .finish_non_exhaustive()
    }
}

impl ClientPool<ConnectionProfile> {
    /// Create a pool of InfluxDB clients from configuration.
    ///
    /// # Errors
    ///
    /// See [`ClientPool::new`].
    pub async fn from_config(config: &PoolConfig) -> Result<Self, PrefillError<ConnectionProfile>> {
        Self::new(config.profile.clone(), config.options.clone()).await
    }
}

impl<C: Connector> ClientPool<C> {
    /// Create a pool and fill it up to capacity with new clients.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any of the clients could not be constructed. In that case all clients
    /// constructed so far are closed, and the returned error contains a usable pool with no idle
    /// clients. New clients will be constructed on demand.
    pub async fn new(connector: C, options: PoolOptions) -> Result<Self, PrefillError<C>> {
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_POOL_NAME.into());
        let capacity = options.capacity.get();
        let pool = Self {
            inner: Arc::new(PoolInner {
                label: pool_kv(&name),
                name,
                metrics: POOL_METRICS.clone(),
                options,
                connector,
                state: Mutex::new(Accounting {
                    idle: VecDeque::with_capacity(capacity),
                    active: 0,
                    closed: false,
                }),
            }),
        };
        let mut clients = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            match pool.inner.create().await {
                Ok(client) => clients.push(client),
                Err(err) => {
                    let constructed = clients.len();
                    warn!(
                        pool = %pool.inner.name,
                        constructed,
                        capacity,
                        error = %err,
                        "unable to prefill pool",
                    );
                    for client in clients {
                        client.close();
                    }
                    pool.inner.record_state();
                    return Err(PrefillError::new(pool, err, constructed));
                }
            }
        }
        pool.inner.state.lock().idle.extend(clients);
        pool.inner.record_state();
        info!(pool = %pool.inner.name, capacity, "pool ready");
        Ok(pool)
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Maximum number of clients in this pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.options.capacity.get()
    }

    /// Current pool accounting.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.inner.snapshot()
    }

    /// Whether [`ClientPool::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Acquire a client from the pool.
    ///
    /// Idle clients are probed before being handed out; dead ones are closed and skipped. If no
    /// idle clients are left but the pool is below capacity, a new client is constructed. If the
    /// pool is at capacity, waits until some client is returned, or until the configured
    /// acquisition timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a new client could not be constructed or failed its first liveness
    /// probe, if acquisition timed out, or if the pool was closed.
    pub async fn acquire(&self) -> Result<PooledClient<C>, PoolError<ClientErrorOf<C>>> {
        self.acquire_within(self.inner.options.acquire_timeout).await
    }

    /// Acquire a client from the pool, waiting for a bounded time.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AcquireTimeout`] if no client was available in time. Other errors
    /// are the same as in [`ClientPool::acquire`].
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledClient<C>, PoolError<ClientErrorOf<C>>> {
        self.acquire_within(Some(timeout)).await
    }

    async fn acquire_within(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PooledClient<C>, PoolError<ClientErrorOf<C>>> {
        let started = Instant::now();
        let span = debug_span!("pool_acquire", pool = %self.inner.name);
        let res = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.inner.checkout_loop())
                .instrument(span)
                .await
                .unwrap_or_else(|_| {
                    self.inner.metrics.timeouts.add(1, &self.inner.label);
                    Err(PoolError::AcquireTimeout)
                }),
            None => self.inner.checkout_loop().instrument(span).await,
        };
        self.inner
            .metrics
            .wait_time
            .record(started.elapsed().as_secs_f64(), &self.inner.label);
        self.inner.record_state();
        res.map(|client| PooledClient::new(self.inner.clone(), client))
    }

    /// Return a client to the pool.
    ///
    /// Same as [`PooledClient::release`].
    pub async fn release(&self, client: PooledClient<C>) {
        client.release().await;
    }

    /// Write a batch of points using a pooled client.
    ///
    /// The client is returned to the pool whether or not the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns acquisition errors as is, and client write errors as [`PoolError::Operation`].
    pub async fn write(&self, batch: &BatchPoints) -> Result<(), PoolError<ClientErrorOf<C>>> {
        let client = self.acquire().await?;
        let started = Instant::now();
        let span = debug_span!("pool_write", pool = %self.inner.name, points = batch.points().len());
        let res = client.write(batch).instrument(span).await;
        self.record_operation("write", started);
        client.release().await;
        res.map_err(PoolError::Operation)
    }

    /// Run a query using a pooled client.
    ///
    /// The client is returned to the pool whether or not the query succeeds.
    ///
    /// # Errors
    ///
    /// Returns acquisition errors as is, and client query errors as [`PoolError::Operation`].
    pub async fn query(&self, query: &Query) -> Result<Response, PoolError<ClientErrorOf<C>>> {
        let client = self.acquire().await?;
        let started = Instant::now();
        let span = debug_span!("pool_query", pool = %self.inner.name, db = %query.database);
        let res = client.query(query).instrument(span).await;
        self.record_operation("query", started);
        client.release().await;
        res.map_err(PoolError::Operation)
    }

    fn record_operation(&self, operation: &'static str, started: Instant) {
        self.inner.metrics.op_duration.record(
            started.elapsed().as_secs_f64(),
            &operation_kv(self.inner.label[0].clone(), operation),
        );
    }

    /// Close the pool.
    ///
    /// All idle clients are closed immediately, and their number is returned. Clients that are
    /// checked out are closed when they are returned. Any further acquisition attempts fail with
    /// [`PoolError::Closed`].
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        let count = drained.len();
        for client in drained {
            client.close();
        }
        self.inner.record_state();
        info!(pool = %self.inner.name, closed = count, "pool closed");
        count
    }
}
