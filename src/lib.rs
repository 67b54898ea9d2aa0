//! # Havvarsel Tracker Core Library
//!
//! This library turns projection responses from the Havvarsel ocean forecast API
//! (operated by the Institute of Marine Research, Norway) into a uniform model of
//! per-variable time series that a sensor registry can republish.
//!
//! ## Design Philosophy
//!
//! ### One Contract, Many Wire Shapes
//! The upstream service has shipped several incompatible response layouts over time.
//! Everything after the [`projection`] module sees only one shape: an ordered set of
//! [`VariableSeries`], each with a sorted series, a "current" value and the metadata
//! the service supplied.
//!
//! ### Current Value Selection
//! A projection spans both past observations and future forecast points, so the
//! "current" value is not the last sample. It is the sample whose timestamp lies
//! closest to the reference instant, see [`resolver::nearest`].
//!
//! ### Data Flow
//! 1. **Catalog**: fetch variable metadata (units, long names), never fatal
//! 2. **Fetch**: one bounded-timeout GET for the projection
//! 3. **Normalize**: detect the wire shape and build a [`ProjectionResult`]
//! 4. **Publish**: replace the previous snapshot atomically
//!
//! ## Core Types
//!
//! - [`Sample`]: one timestamped value, possibly absent
//! - [`VariableSeries`]: everything known about one variable in one response
//! - [`ProjectionResult`]: the immutable snapshot produced by one refresh
//! - [`VariableCatalogEntry`]: metadata-only record from the catalog endpoint

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod compat;
pub mod config;
pub mod poller;
pub mod projection;
pub mod resolver;
pub mod transport;

/// A geographic point in decimal degrees (WGS84).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude, east positive
    pub lon: f64,
    /// Latitude, north positive
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// One key/value pair of upstream variable metadata (units, long_name, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Look up the first non-empty metadata value stored under `key`.
///
/// An entry upstream sent without a value counts as absent, so callers' own
/// fallbacks apply.
///
/// # Example
/// ```
/// use havvarsel_lib::{metadata_value, MetadataEntry};
///
/// let metadata = vec![MetadataEntry::new("units", ""), MetadataEntry::new("long_name", "Salinity")];
/// assert_eq!(metadata_value(&metadata, "units"), None);
/// assert_eq!(metadata_value(&metadata, "long_name"), Some("Salinity"));
/// ```
pub fn metadata_value<'a>(metadata: &'a [MetadataEntry], key: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|entry| entry.key == key && !entry.value.is_empty())
        .map(|entry| entry.value.as_str())
}

/// A single value of one variable at one instant.
///
/// `raw_time` keeps the upstream epoch-millisecond stamp so nearest-sample
/// selection can work on integers; `timestamp` is the same instant in UTC.
///
/// # Example
/// ```
/// use havvarsel_lib::Sample;
///
/// let sample = Sample::from_millis(1_760_853_600_000, Some(11.593)).unwrap();
/// assert_eq!(sample.timestamp.to_rfc3339(), "2025-10-19T06:00:00+00:00");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Instant of the sample, serialized as ISO-8601 UTC
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the Unix epoch, as delivered upstream
    pub raw_time: i64,
    /// Parsed value; `None` when upstream sent null or something non-numeric
    pub value: Option<f64>,
}

impl Sample {
    /// Build a sample from an epoch-millisecond stamp.
    ///
    /// Returns `None` when the stamp is outside chrono's representable range.
    pub fn from_millis(raw_time: i64, value: Option<f64>) -> Option<Self> {
        DateTime::from_timestamp_millis(raw_time).map(|timestamp| Self {
            timestamp,
            raw_time,
            value,
        })
    }
}

/// Everything one response says about one variable.
///
/// Invariants:
/// - `series` is sorted ascending by timestamp; equal timestamps keep their
///   upstream order
/// - `current` is the value of the sample closest to the parse-time reference
///   instant, first-seen winning ties; `current_at` is that sample's instant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableSeries {
    pub name: String,
    /// Upstream metadata, passed through verbatim
    pub metadata: Vec<MetadataEntry>,
    pub series: Vec<Sample>,
    pub current: Option<f64>,
    pub current_at: Option<DateTime<Utc>>,
}

impl VariableSeries {
    /// The `units` metadata value, if upstream supplied one.
    pub fn units(&self) -> Option<&str> {
        metadata_value(&self.metadata, "units")
    }

    /// The `long_name` metadata value, if upstream supplied one.
    pub fn long_name(&self) -> Option<&str> {
        metadata_value(&self.metadata, "long_name")
    }

    /// Human-readable description: `long_name`, else the variable name.
    pub fn description(&self) -> &str {
        self.long_name().unwrap_or(&self.name)
    }
}

/// Variables of one response in the order they were first observed.
///
/// Serializes as a JSON object keyed by variable name, keeping that order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables(Vec<VariableSeries>);

impl Variables {
    /// Wrap already-unique series. Later duplicates of a name are dropped.
    pub fn new(series: Vec<VariableSeries>) -> Self {
        let mut variables = Self::default();
        for entry in series {
            if variables.get(&entry.name).is_none() {
                variables.0.push(entry);
            }
        }
        variables
    }

    pub fn get(&self, name: &str) -> Option<&VariableSeries> {
        self.0.iter().find(|series| series.name == name)
    }

    pub fn first(&self) -> Option<&VariableSeries> {
        self.0.first()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|series| series.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VariableSeries> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Variables {
    type Item = &'a VariableSeries;
    type IntoIter = std::slice::Iter<'a, VariableSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Variables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for series in &self.0 {
            map.serialize_entry(&series.name, series)?;
        }
        map.end()
    }
}

/// The uniform projection envelope produced by one parse.
///
/// Immutable once built; the poller swaps whole snapshots rather than
/// editing one in place.
///
/// Serializes as `{"variables": {...}, "queryPoint": {"longitude", "latitude"},
/// "nearestGrid": {"lon", "lat"}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub variables: Variables,
    /// Coordinates as requested
    #[serde(serialize_with = "serialize_query_point")]
    pub query_point: GeoPoint,
    /// Closest grid cell with data, or the query point when upstream omits it
    pub nearest_grid: GeoPoint,
}

fn serialize_query_point<S: Serializer>(point: &GeoPoint, serializer: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct QueryPoint {
        longitude: f64,
        latitude: f64,
    }

    QueryPoint {
        longitude: point.lon,
        latitude: point.lat,
    }
    .serialize(serializer)
}

impl ProjectionResult {
    pub fn variable(&self, name: &str) -> Option<&VariableSeries> {
        self.variables.get(name)
    }
}

/// Metadata-only description of a variable the service supports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableCatalogEntry {
    pub name: String,
    /// `long_name` from the metadata, or `name` when absent
    pub description: String,
    pub metadata: Vec<MetadataEntry>,
}
