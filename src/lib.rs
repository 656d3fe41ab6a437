#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

mod config;
mod connector;
mod errors;
mod logging;
mod metrics;
mod pool;
mod profile;

pub use fluxpool_client as client;

pub use self::{
    config::{PoolConfig, PoolOptions, ServiceConfig, ServiceConfigBuilder, ServiceConfigError},
    connector::{ClientErrorOf, Connector},
    errors::{PoolError, PrefillError},
    logging::{
        LoggingConfig, LoggingDestination, LoggingError, LoggingFormat, LoggingLevel,
        LoggingSubscriberConfig,
    },
    metrics::PoolState,
    pool::{ClientPool, PooledClient},
    profile::{ConnectionProfile, InfluxClient},
};
