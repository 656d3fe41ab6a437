//! Pool metrics, following OpenTelemetry database client semantic conventions.

use std::sync::{Arc, LazyLock};

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram},
    Key, KeyValue, StringValue, Value,
};

/// Central metrics singleton shared by all pools.
pub(crate) static POOL_METRICS: LazyLock<Arc<Metrics>> = LazyLock::new(|| Arc::new(Metrics::new()));

const KEY_POOL_NAME: Key = Key::from_static_str("db.client.connection.pool.name");
const KEY_STATE: Key = Key::from_static_str("db.client.connection.state");
const KEY_OPERATION: Key = Key::from_static_str("db.operation.name");

/// Storage for pool metrics.
pub(crate) struct Metrics {
    /// The number of connections that are currently in state described by the state attribute.
    pub(crate) conn_count: Gauge<u64>,
    /// The maximum number of open connections allowed.
    pub(crate) conn_max: Gauge<u64>,
    /// The time it took to obtain an open connection from the pool.
    pub(crate) wait_time: Histogram<f64>,
    /// The time between borrowing a connection and returning it to the pool.
    pub(crate) use_time: Histogram<f64>,
    /// The time it took to create a new connection.
    pub(crate) create_time: Histogram<f64>,
    /// The number of connection timeouts that have occurred trying to obtain a connection.
    pub(crate) timeouts: Counter<u64>,
    /// Duration of database client operations.
    pub(crate) op_duration: Histogram<f64>,
}

impl Metrics {
    /// Create new storage for pool metrics.
    pub(crate) fn new() -> Self {
        let meter = global::meter("fluxpool");
        let conn_count = meter
            .u64_gauge("db.client.connection.count")
            .with_description("The number of connections that are currently in state described by the state attribute.")
            .build();
        let conn_max = meter
            .u64_gauge("db.client.connection.max")
            .with_description("The maximum number of open connections allowed.")
            .build();
        let wait_time = meter
            .f64_histogram("db.client.connection.wait_time")
            .with_unit("s")
            .with_description("The time it took to obtain an open connection from the pool.")
            .build();
        let use_time = meter
            .f64_histogram("db.client.connection.use_time")
            .with_unit("s")
            .with_description(
                "The time between borrowing a connection and returning it to the pool.",
            )
            .build();
        let create_time = meter
            .f64_histogram("db.client.connection.create_time")
            .with_unit("s")
            .with_description("The time it took to create a new connection.")
            .build();
        let timeouts = meter
            .u64_counter("db.client.connection.timeouts")
            .with_description("The number of connection timeouts that have occurred trying to obtain a connection from the pool.")
            .build();
        let op_duration = meter
            .f64_histogram("db.client.operation.duration")
            .with_unit("s")
            .with_description("Duration of database client operations.")
            .build();
        Metrics {
            conn_count,
            conn_max,
            wait_time,
            use_time,
            create_time,
            timeouts,
            op_duration,
        }
    }

    pub(crate) fn record_state(&self, label: &[KeyValue; 1], state: PoolState) {
        self.conn_max.record(state.capacity as u64, label);
        self.conn_count
            .record(state.idle as u64, &state_kv(label[0].clone(), "idle"));
        self.conn_count
            .record(state.active as u64, &state_kv(label[0].clone(), "used"));
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

pub(crate) fn pool_kv(name: &str) -> [KeyValue; 1] {
    [KeyValue::new(KEY_POOL_NAME, name.to_string())]
}

pub(crate) fn state_kv(name: KeyValue, state: &'static str) -> [KeyValue; 2] {
    [
        name,
        KeyValue::new(KEY_STATE, Value::String(StringValue::from(state))),
    ]
}

pub(crate) fn operation_kv(name: KeyValue, operation: &'static str) -> [KeyValue; 2] {
    [name, KeyValue::new(KEY_OPERATION, operation)]
}

/// Snapshot of pool accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolState {
    /// Maximum total (`idle` + `active`) number of clients.
    pub capacity: usize,
    /// Current number of idle clients.
    pub idle: usize,
    /// Current number of checked out clients.
    pub active: usize,
}

impl PoolState {
    /// Current total (`idle` + `active`) number of clients.
    #[must_use]
    pub fn size(&self) -> usize {
        self.idle + self.active
    }
}
