//! Points, batches and line protocol encoding.

use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
const KEY_SPECIAL: &[char] = &[',', '=', ' '];

/// Timestamp precision used when writing points.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[non_exhaustive]
pub enum Precision {
    /// Nanoseconds.
    #[default]
    #[serde(rename = "ns", alias = "n")]
    Nanoseconds,
    /// Microseconds.
    #[serde(rename = "u", alias = "us")]
    Microseconds,
    /// Milliseconds.
    #[serde(rename = "ms")]
    Milliseconds,
    /// Seconds.
    #[serde(rename = "s")]
    Seconds,
    /// Minutes.
    #[serde(rename = "m")]
    Minutes,
    /// Hours.
    #[serde(rename = "h")]
    Hours,
}

impl Precision {
    /// Value used in `precision` and `epoch` request parameters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "u",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }

    /// Length of one precision unit, in nanoseconds.
    #[must_use]
    fn unit_nanos(self) -> i128 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60_000_000_000,
            Self::Hours => 3_600_000_000_000,
        }
    }

    /// Express a point in time as a number of units since Unix epoch.
    #[must_use]
    pub fn timestamp(self, time: SystemTime) -> i128 {
        epoch_nanos(time) / self.unit_nanos()
    }

    /// Round a point in time to the nearest precision unit, in nanoseconds since Unix epoch.
    ///
    /// Halfway values are rounded up.
    #[must_use]
    pub fn round_nanos(self, time: SystemTime) -> i128 {
        let unit = self.unit_nanos();
        (epoch_nanos(time) + unit / 2).div_euclid(unit) * unit
    }
}

/// Write consistency level for clustered installations.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Consistency {
    /// Any node, including hinted handoff.
    Any,
    /// At least one node.
    One,
    /// Majority of nodes.
    Quorum,
    /// All nodes.
    All,
}

impl Consistency {
    /// Value used in `consistency` request parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::One => "one",
            Self::Quorum => "quorum",
            Self::All => "all",
        }
    }
}

/// Field value of a point.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// 64-bit float.
    Float(f64),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Unsigned 64-bit integer.
    Unsigned(u64),
    /// String.
    String(String),
    /// Boolean.
    Boolean(bool),
}

impl FieldValue {
    fn encode(&self, out: &mut String) {
        match self {
            Self::Float(val) => out.push_str(&val.to_string()),
            Self::Integer(val) => {
                out.push_str(&val.to_string());
                out.push('i');
            }
            Self::Unsigned(val) => {
                out.push_str(&val.to_string());
                out.push('u');
            }
            Self::String(val) => {
                out.push('"');
                for c in val.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            Self::Boolean(val) => out.push_str(if *val { "true" } else { "false" }),
        }
    }
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

field_value_from! {
    f64 => Float,
    f32 => Float,
    i64 => Integer,
    i32 => Integer,
    u64 => Unsigned,
    u32 => Unsigned,
    bool => Boolean,
    String => String,
    &str => String,
}

/// Single data point.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    time: Option<SystemTime>,
}

impl Point {
    /// Start building a point for a measurement.
    #[must_use]
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: None,
        }
    }

    /// Measurement name.
    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tag set, sorted by key.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Field set, sorted by key.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Point timestamp, if set.
    ///
    /// Points without a timestamp get one assigned by the server.
    #[must_use]
    pub fn time(&self) -> Option<SystemTime> {
        self.time
    }

    /// Encode point as a single line protocol line, without trailing newline.
    #[must_use]
    pub fn to_line(&self, precision: Precision) -> String {
        self.encode(self.time.map(|time| precision.timestamp(time)))
    }

    /// Encode point as a single line protocol line, with timestamp rounded to `precision` but
    /// expressed in nanoseconds.
    ///
    /// Used by transports that can't pass precision to the server.
    #[must_use]
    pub fn to_line_in_nanos(&self, precision: Precision) -> String {
        self.encode(self.time.map(|time| precision.round_nanos(time)))
    }

    fn encode(&self, timestamp: Option<i128>) -> String {
        let mut out = String::with_capacity(64);
        escape_into(&mut out, &self.measurement, MEASUREMENT_SPECIAL);
        for (key, value) in &self.tags {
            out.push(',');
            escape_into(&mut out, key, KEY_SPECIAL);
            out.push('=');
            escape_into(&mut out, value, KEY_SPECIAL);
        }
        let mut sep = ' ';
        for (key, value) in &self.fields {
            out.push(sep);
            sep = ',';
            escape_into(&mut out, key, KEY_SPECIAL);
            out.push('=');
            value.encode(&mut out);
        }
        if let Some(timestamp) = timestamp {
            out.push(' ');
            out.push_str(&timestamp.to_string());
        }
        out
    }
}

/// Builder for [`Point`].
#[derive(Clone, Debug)]
#[must_use]
pub struct PointBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    time: Option<SystemTime>,
}

impl PointBuilder {
    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set point timestamp.
    pub fn time(mut self, time: SystemTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Validate and build the point.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidPoint`] if measurement name is empty, if there are no fields,
    /// if a tag has an empty key or value, or if any float field is not finite.
    pub fn build(self) -> Result<Point, ClientError> {
        if self.measurement.is_empty() {
            return Err(ClientError::InvalidPoint("measurement name is empty"));
        }
        if self.fields.is_empty() {
            return Err(ClientError::InvalidPoint("point has no fields"));
        }
        if self.tags.iter().any(|(k, v)| k.is_empty() || v.is_empty()) {
            return Err(ClientError::InvalidPoint("tag key or value is empty"));
        }
        if self.fields.keys().any(String::is_empty) {
            return Err(ClientError::InvalidPoint("field key is empty"));
        }
        if self
            .fields
            .values()
            .any(|v| matches!(v, FieldValue::Float(f) if !f.is_finite()))
        {
            return Err(ClientError::InvalidPoint("float field is not finite"));
        }
        Ok(Point {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            time: self.time,
        })
    }
}

/// Batch of points written together.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchPoints {
    database: String,
    retention_policy: Option<String>,
    precision: Precision,
    consistency: Option<Consistency>,
    points: Vec<Point>,
}

impl BatchPoints {
    /// Create an empty batch for a database.
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retention_policy: None,
            precision: Precision::default(),
            consistency: None,
            points: Vec::new(),
        }
    }

    /// Set retention policy to write into.
    #[must_use]
    pub fn with_retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = Some(rp.into());
        self
    }

    /// Set timestamp precision.
    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set write consistency level.
    #[must_use]
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Append a point.
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Target database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Target retention policy.
    #[must_use]
    pub fn retention_policy(&self) -> Option<&str> {
        self.retention_policy.as_deref()
    }

    /// Timestamp precision.
    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Write consistency level.
    #[must_use]
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }

    /// Points in this batch.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Iterate over line protocol lines, one per point.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.points.iter().map(|p| p.to_line(self.precision))
    }

    /// Iterate over line protocol lines with nanosecond timestamps, rounded to batch precision.
    pub fn lines_in_nanos(&self) -> impl Iterator<Item = String> + '_ {
        self.points.iter().map(|p| p.to_line_in_nanos(self.precision))
    }

    /// Encode the whole batch as newline-separated line protocol.
    #[must_use]
    pub fn to_line_protocol(&self) -> String {
        let mut body = String::new();
        for line in self.lines() {
            body.push_str(&line);
            body.push('\n');
        }
        body
    }
}

impl Extend<Point> for BatchPoints {
    fn extend<T: IntoIterator<Item = Point>>(&mut self, iter: T) {
        self.points.extend(iter);
    }
}

fn epoch_nanos(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_nanos() as i128,
        Err(err) => -(err.duration().as_nanos() as i128),
    }
}

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn line_with_tags_and_typed_fields() {
        let point = Point::builder("cpu")
            .tag("region", "eu")
            .tag("host", "a1")
            .field("usage", 0.5)
            .field("cores", 8i64)
            .field("up", true)
            .field("ticks", 7u64)
            .field("state", "ok")
            .time(at(1))
            .build()
            .unwrap();
        assert_eq!(
            point.to_line(Precision::Seconds),
            r#"cpu,host=a1,region=eu cores=8i,state="ok",ticks=7u,up=true,usage=0.5 1"#
        );
    }

    #[test]
    fn line_escapes_special_characters() {
        let point = Point::builder("disk usage,total")
            .tag("mount point", "/var=x,y")
            .field("free space", "say \"hi\" \\o/")
            .build()
            .unwrap();
        assert_eq!(
            point.to_line(Precision::Nanoseconds),
            r#"disk\ usage\,total,mount\ point=/var\=x\,y free\ space="say \"hi\" \\o/""#
        );
    }

    #[test]
    fn whole_floats_have_no_fraction() {
        let point = Point::builder("m").field("v", 42.0).build().unwrap();
        assert_eq!(point.to_line(Precision::Nanoseconds), "m v=42");
    }

    #[test]
    fn timestamp_follows_precision() {
        let time = UNIX_EPOCH + Duration::from_millis(7_200_123);
        assert_eq!(Precision::Nanoseconds.timestamp(time), 7_200_123_000_000);
        assert_eq!(Precision::Microseconds.timestamp(time), 7_200_123_000);
        assert_eq!(Precision::Milliseconds.timestamp(time), 7_200_123);
        assert_eq!(Precision::Seconds.timestamp(time), 7_200);
        assert_eq!(Precision::Minutes.timestamp(time), 120);
        assert_eq!(Precision::Hours.timestamp(time), 2);
    }

    #[test]
    fn timestamp_before_epoch_is_negative() {
        let time = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(Precision::Seconds.timestamp(time), -5);
    }

    #[test]
    fn nanosecond_lines_are_rounded_to_precision() {
        let point = Point::builder("m")
            .field("v", 1i64)
            .time(UNIX_EPOCH + Duration::from_millis(10_600))
            .build()
            .unwrap();
        assert_eq!(point.to_line_in_nanos(Precision::Seconds), "m v=1i 11000000000");
        assert_eq!(
            point.to_line_in_nanos(Precision::Milliseconds),
            "m v=1i 10600000000"
        );
        assert_eq!(point.to_line(Precision::Seconds), "m v=1i 10");
    }

    #[test]
    fn round_nanos_before_epoch() {
        let time = UNIX_EPOCH - Duration::from_millis(1_400);
        assert_eq!(Precision::Seconds.round_nanos(time), -1_000_000_000);
        let time = UNIX_EPOCH - Duration::from_millis(1_600);
        assert_eq!(Precision::Seconds.round_nanos(time), -2_000_000_000);
    }

    #[test]
    fn invalid_points_are_rejected() {
        assert!(Point::builder("").field("v", 1i64).build().is_err());
        assert!(Point::builder("m").build().is_err());
        assert!(Point::builder("m").tag("t", "").field("v", 1i64).build().is_err());
        assert!(Point::builder("m").field("v", f64::NAN).build().is_err());
        assert!(Point::builder("m").field("v", f64::INFINITY).build().is_err());
    }

    #[test]
    fn batch_encodes_one_line_per_point() {
        let mut batch = BatchPoints::new("telemetry").with_precision(Precision::Seconds);
        batch.extend([
            Point::builder("a").field("v", 1i64).time(at(10)).build().unwrap(),
            Point::builder("b").field("v", 2i64).time(at(20)).build().unwrap(),
        ]);
        assert_eq!(batch.to_line_protocol(), "a v=1i 10\nb v=2i 20\n");
    }

    #[test]
    fn precision_names() {
        let parsed: Precision = serde_json::from_str(r#""ms""#).unwrap();
        assert_eq!(parsed, Precision::Milliseconds);
        assert_eq!(Precision::Microseconds.as_str(), "u");
        assert_eq!(Consistency::Quorum.as_str(), "quorum");
    }
}
