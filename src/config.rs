//! Pool and service configuration structures.

use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{logging::LoggingConfig, profile::ConnectionProfile};

/// Pool behavior settings, independent of transport.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct PoolOptions {
    /// Pool name, used in logs and as metrics label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Maximum number of clients (idle + checked out) that may exist at once.
    ///
    /// Pool is filled up to this size on creation. Default is 10.
    #[serde(default = "PoolOptions::default_capacity", alias = "max_size")]
    pub capacity: NonZeroUsize,
    /// Time limit for liveness probes.
    ///
    /// Default is 100 milliseconds.
    #[serde(
        default = "PoolOptions::default_probe_timeout",
        with = "humantime_serde"
    )]
    pub probe_timeout: Duration,
    /// Delay between acquisition attempts while the pool is exhausted.
    ///
    /// Default is 50 milliseconds.
    #[serde(
        default = "PoolOptions::default_retry_interval",
        with = "humantime_serde"
    )]
    pub retry_interval: Duration,
    /// Give up waiting for a client after this much time.
    ///
    /// Default is to wait indefinitely.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            name: None,
            capacity: Self::default_capacity(),
            probe_timeout: Self::default_probe_timeout(),
            retry_interval: Self::default_retry_interval(),
            acquire_timeout: None,
        }
    }
}

impl PoolOptions {
    /// Options with default settings and provided capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Set pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set liveness probe time limit.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set delay between acquisition attempts.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set acquisition time limit.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Default value for [`Self::capacity`].
    #[must_use]
    #[inline]
    fn default_capacity() -> NonZeroUsize {
        NonZeroUsize::MIN.saturating_add(9)
    }

    /// Default value for [`Self::probe_timeout`].
    #[must_use]
    #[inline]
    fn default_probe_timeout() -> Duration {
        Duration::from_millis(100)
    }

    /// Default value for [`Self::retry_interval`].
    #[must_use]
    #[inline]
    fn default_retry_interval() -> Duration {
        Duration::from_millis(50)
    }
}

/// Complete pool configuration: behavior plus connection profile.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Pool behavior settings.
    #[serde(flatten)]
    pub options: PoolOptions,
    /// Connection profile for pooled clients.
    #[serde(alias = "client")]
    pub profile: ConnectionProfile,
}

impl PoolConfig {
    /// Create pool configuration.
    #[must_use]
    pub fn new(options: PoolOptions, profile: impl Into<ConnectionProfile>) -> Self {
        Self {
            options,
            profile: profile.into(),
        }
    }
}

/// Root container for service configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ServiceConfig {
    /// Client pool configuration.
    pub pool: PoolConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Create builder for service configuration.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }
}

/// Top-level service configuration error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceConfigError {
    /// Configuration builder error
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Builder for service configuration.
#[must_use]
pub struct ServiceConfigBuilder {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceConfigBuilder {
    /// Alternative method to construct a service configuration builder.
    pub fn new() -> Self {
        Self {
            builder: config::Config::builder(),
        }
    }

    /// Try to build configuration object from preconfigured sources.
    ///
    /// This method will do all the I/O necessary to load the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if some configuration loading was unsuccessful.
    pub fn build(self) -> Result<ServiceConfig, ServiceConfigError> {
        self.builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Add a custom object implementing [`Source`] trait as a source of service configuration.
    ///
    /// [`Source`]: config::Source
    pub fn with_source<T>(mut self, source: T) -> Self
    where
        T: config::Source + Send + Sync + 'static,
    {
        self.builder = self.builder.add_source(source);
        self
    }

    /// Add file as a source of service configuration.
    pub fn with_file(self, name: impl AsRef<str>) -> Self {
        self.with_source(config::File::with_name(name.as_ref()))
    }

    /// Add environment variables as a source of service configuration.
    ///
    /// Nested keys are separated with `__`, e.g. `PREFIX_POOL__CAPACITY`.
    pub fn with_env(self, prefix: impl AsRef<str>) -> Self {
        self.with_source(
            config::Environment::with_prefix(prefix.as_ref())
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }
}
