//! Logging configuration via [`tracing`] crate.

use std::{collections::BTreeMap, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, writer::BoxMakeWriter},
    layer::{Layer, Layered, SubscriberExt},
    registry::Registry,
    util::{SubscriberInitExt, TryInitError},
};

type LoggingRegistry = Layered<Vec<Box<dyn Layer<Registry> + Send + Sync>>, Registry>;

/// Error type used in logging configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    /// Log destination I/O error.
    #[error("Log destination I/O error: {0}")]
    Io(#[from] io::Error),
    /// Global subscriber was already installed.
    #[error("Unable to install global subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LoggingConfig {
    /// List of subscribers defined in configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscribers: Vec<LoggingSubscriberConfig>,
}

impl LoggingConfig {
    /// Create registry subscriber from configuration.
    ///
    /// Returned guards must be kept alive for as long as logging is needed; dropping them flushes
    /// and stops background writers.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any of the subscribers cannot be initialized.
    pub fn make_registry(&self) -> Result<(LoggingRegistry, Vec<WorkerGuard>), LoggingError> {
        let mut layers = Vec::with_capacity(self.subscribers.len());
        let mut guards = Vec::with_capacity(self.subscribers.len());
        for sub_cfg in &self.subscribers {
            let (layer, guard) = sub_cfg.make_layer()?;
            layers.push(layer);
            guards.push(guard);
        }
        Ok((Registry::default().with(layers), guards))
    }

    /// Build registry subscriber and install it as the global default.
    ///
    /// # Errors
    ///
    /// Returns `Err` if subscribers cannot be initialized, or a global subscriber is already set.
    pub fn init(&self) -> Result<Vec<WorkerGuard>, LoggingError> {
        let (registry, guards) = self.make_registry()?;
        registry.try_init()?;
        Ok(guards)
    }
}

/// Individual logging subscriber configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LoggingSubscriberConfig {
    /// Overall format for logging output.
    #[serde(default, flatten)]
    pub format: LoggingFormat,
    /// Minimum severity level to include in output.
    #[serde(default)]
    pub level: LoggingLevel,
    /// Custom minimum severity levels for span targets.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, LoggingLevel>,
    /// Use ANSI escape sequences for output colors and formatting.
    #[serde(default)]
    pub color: bool,
    /// Print event target and source location.
    #[serde(default)]
    pub print_location: bool,
    /// Maximum buffered lines to store before dropping new events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_lines: Option<usize>,
    /// Log destination configuration.
    #[serde(default)]
    pub output: LoggingDestination,
}

impl LoggingSubscriberConfig {
    /// Make [`tracing_subscriber::Layer`] from subscriber configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if log destination cannot be opened.
    pub fn make_layer<S>(
        &self,
    ) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let mut buf_builder = NonBlockingBuilder::default().lossy(true);
        if let Some(lines) = self.buffer_lines {
            buf_builder = buf_builder.buffered_lines_limit(lines);
        }
        let (writer, guard) = self.output.make_writer(buf_builder)?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.color)
            .with_target(self.print_location)
            .with_file(self.print_location)
            .with_line_number(self.print_location);
        let layer = match self.format {
            LoggingFormat::Full => layer.boxed(),
            LoggingFormat::Compact => layer.compact().boxed(),
            LoggingFormat::Pretty => layer.pretty().boxed(),
            LoggingFormat::Json {
                flatten_metadata,
                current_span,
            } => layer
                .json()
                .flatten_event(flatten_metadata)
                .with_current_span(current_span)
                .boxed(),
        };
        let filter = Targets::new()
            .with_targets(self.targets.clone())
            .with_default(LevelFilter::from(self.level));
        Ok((layer.with_filter(filter).boxed(), guard))
    }
}

/// Format for logging output.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase", tag = "format")]
pub enum LoggingFormat {
    /// Format which prints span context before log message.
    #[default]
    Full,
    /// More compact format, span names are hidden.
    Compact,
    /// Verbose multiline format, for development.
    Pretty,
    /// Newline-delimited JSON objects.
    Json {
        /// Flatten event metadata fields into object.
        #[serde(default)]
        flatten_metadata: bool,
        /// Add current span name to object.
        #[serde(default)]
        current_span: bool,
    },
}

/// Minumum event severity for log output.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoggingLevel {
    /// Disables logging altogether.
    #[serde(alias = "off")]
    Off,
    /// Write "error" level only.
    #[serde(alias = "error")]
    Error,
    /// Write "warn" and more severe levels.
    #[serde(alias = "warn", alias = "warning")]
    Warn,
    /// Write "info" and more severe levels.
    #[serde(alias = "info")]
    #[default]
    Info,
    /// Write "debug" and more severe levels.
    #[serde(alias = "debug")]
    Debug,
    /// Write everything.
    #[serde(alias = "trace")]
    Trace,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(value: LoggingLevel) -> Self {
        match value {
            LoggingLevel::Off => LevelFilter::OFF,
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Logging output destination configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum LoggingDestination {
    /// Output to standard output.
    #[default]
    #[serde(alias = "stdout")]
    StdOut,
    /// Output to standard error.
    #[serde(alias = "stderr")]
    StdErr,
    /// Append to a file.
    File {
        /// Path to file.
        path: PathBuf,
    },
}

impl LoggingDestination {
    /// Make non-blocking writer for this destination.
    ///
    /// # Errors
    ///
    /// Returns `Err` if output file cannot be opened.
    pub fn make_writer(
        &self,
        buf_builder: NonBlockingBuilder,
    ) -> Result<(BoxMakeWriter, WorkerGuard), LoggingError> {
        let (writer, guard) = match self {
            Self::StdOut => buf_builder.finish(io::stdout()),
            Self::StdErr => buf_builder.finish(io::stderr()),
            Self::File { path } => {
                let file = fs::OpenOptions::new().append(true).create(true).open(path)?;
                buf_builder.finish(file)
            }
        };
        Ok((BoxMakeWriter::new(writer), guard))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserialize_subscribers() {
        let cfg: LoggingConfig = serde_json::from_value(json!({
            "subscribers": [
                {"format": "compact", "level": "debug", "targets": {"fluxpool": "trace"}},
                {"format": "json", "current_span": true, "output": {"type": "stderr"}}
            ]
        }))
        .unwrap();
        assert_eq!(cfg.subscribers.len(), 2);
        assert_eq!(cfg.subscribers[0].format, LoggingFormat::Compact);
        assert_eq!(cfg.subscribers[0].level, LoggingLevel::Debug);
        assert_eq!(cfg.subscribers[0].targets["fluxpool"], LoggingLevel::Trace);
        assert_eq!(
            cfg.subscribers[1].format,
            LoggingFormat::Json {
                flatten_metadata: false,
                current_span: true
            }
        );
        assert_eq!(cfg.subscribers[1].output, LoggingDestination::StdErr);
    }

    #[test]
    fn registry_is_built_for_each_subscriber() {
        let path = std::env::temp_dir().join(format!("fluxpool-log-{}.log", std::process::id()));
        let cfg = LoggingConfig {
            subscribers: vec![
                LoggingSubscriberConfig::default(),
                LoggingSubscriberConfig {
                    output: LoggingDestination::File { path: path.clone() },
                    ..LoggingSubscriberConfig::default()
                },
            ],
        };
        let (_registry, guards) = cfg.make_registry().unwrap();
        assert_eq!(guards.len(), 2);
        drop(guards);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn unwritable_file_fails() {
        let cfg = LoggingSubscriberConfig {
            output: LoggingDestination::File {
                path: PathBuf::from("/nonexistent-dir/fluxpool.log"),
            },
            ..LoggingSubscriberConfig::default()
        };
        assert!(cfg.make_layer::<Registry>().is_err());
    }
}
