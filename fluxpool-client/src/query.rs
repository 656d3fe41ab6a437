//! Queries and query responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::point::Precision;

/// InfluxQL query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// Query text.
    pub command: String,
    /// Database to run the query against.
    pub database: String,
    /// Retention policy to use, if not the default one.
    pub retention_policy: Option<String>,
    /// Return timestamps as epoch numbers in this precision instead of RFC3339 strings.
    pub epoch: Option<Precision>,
    /// Bound parameters, referenced as `$name` from query text.
    pub parameters: BTreeMap<String, Value>,
}

impl Query {
    /// Create a query against a database.
    #[must_use]
    pub fn new(command: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Request epoch timestamps.
    #[must_use]
    pub fn with_epoch(mut self, epoch: Precision) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Use a non-default retention policy.
    #[must_use]
    pub fn with_retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = Some(rp.into());
        self
    }

    /// Bind a parameter value.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Query response.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Response {
    /// One result per query statement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<StatementResult>,
    /// Request-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// First error found in the response, request-level or per-statement.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }
}

/// Result of a single statement.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct StatementResult {
    /// Statement index within the query.
    #[serde(default)]
    pub statement_id: usize,
    /// Returned series.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Series>,
    /// Informational messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    /// Statement error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Series of rows sharing a measurement and tag set.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Series {
    /// Measurement name.
    #[serde(default)]
    pub name: String,
    /// Tag set of a grouped series.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Column names.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Row values, in column order.
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// Informational message attached to a statement result.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Message {
    /// Message severity.
    pub level: String,
    /// Message text.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_series() {
        let body = json!({
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "cpu",
                    "tags": {"host": "a1"},
                    "columns": ["time", "usage"],
                    "values": [[10, 0.5], [20, 0.75]]
                }]
            }]
        });
        let resp: Response = serde_json::from_value(body).unwrap();
        assert_eq!(resp.error(), None);
        let series = &resp.results[0].series[0];
        assert_eq!(series.name, "cpu");
        assert_eq!(series.tags["host"], "a1");
        assert_eq!(series.values[1], vec![json!(20), json!(0.75)]);
    }

    #[test]
    fn statement_error_is_reported() {
        let body = json!({
            "results": [
                {"statement_id": 0},
                {"statement_id": 1, "error": "database not found: nope"}
            ]
        });
        let resp: Response = serde_json::from_value(body).unwrap();
        assert_eq!(resp.error(), Some("database not found: nope"));
    }

    #[test]
    fn request_error_takes_priority() {
        let resp = Response {
            results: vec![StatementResult {
                error: Some("statement".into()),
                ..StatementResult::default()
            }],
            error: Some("request".into()),
        };
        assert_eq!(resp.error(), Some("request"));
    }
}
