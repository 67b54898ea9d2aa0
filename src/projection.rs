//! # Projection Response Normalizer
//!
//! The `/dataprojection` endpoint family has answered in more than one layout over
//! time. This module probes the top-level structure, picks the matching
//! [`RawPayload`] case and folds it into a [`ProjectionResult`].
//!
//! ## Recognized Shapes
//!
//! Detection is ordered; the first match wins.
//!
//! 1. **Variables array**: one element per variable, each carrying its own metadata
//!    and samples. The older single-variable temperature feed is the one-element
//!    case of this shape.
//!    ```json
//!    {"variables": [{"variableName": "temperature",
//!                    "metadata": [{"key": "units", "value": "Celsius"}],
//!                    "data": [{"rawTime": 1760853600000, "value": 11.59}]}]}
//!    ```
//! 2. **Time-point major**: one element per instant, each listing every variable's
//!    value at that instant. Metadata is not inline and comes from the catalog.
//!    ```json
//!    {"data": [{"rawTime": 1760853600000,
//!               "data": [{"key": "temperature", "value": "11.593"},
//!                        {"key": "salinity", "value": "28.152"}]}]}
//!    ```
//!
//! ## Error Policy
//!
//! Structural surprises (wrong top-level type, missing or non-array collections,
//! non-object elements) fail the whole parse with a [`ParseError`]: a result with
//! the wrong shape is worse than a failed refresh. Individual sample values are
//! treated leniently: anything that is not a finite number becomes an absent value
//! and the parse carries on.

use crate::catalog::MetadataMap;
use crate::{resolver, GeoPoint, MetadataEntry, ProjectionResult, Sample, VariableSeries, Variables};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Upstream field holding the nearest grid cell that has data.
const CLOSEST_GRID_FIELD: &str = "closestGridPointWithData";

/// Structural failures that abort a parse.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("projection payload is not a JSON object")]
    NotAnObject,

    #[error("projection payload has neither a `variables` nor a `data` array")]
    MissingArray,

    #[error("`{0}` is not an array")]
    NotAnArray(String),

    #[error("`{0}` is not an object")]
    NotAnObjectElement(String),

    #[error("`{field}` has an unusable value: {value}")]
    InvalidField { field: String, value: String },

    #[error("timestamp {0} ms is outside the representable range")]
    TimestampOutOfRange(i64),
}

/// A projection payload, classified by its structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawPayload<'a> {
    /// `{"variables": [{variableName|variable, metadata, data: [{rawTime, value}]}]}`
    VariablesArray(&'a [Value]),
    /// `{"data": [{rawTime, data: [{key, value}]}]}`
    TimePointMajor(&'a [Value]),
}

impl<'a> RawPayload<'a> {
    /// Probe `raw` for a known shape.
    pub fn detect(raw: &'a Value) -> Result<Self, ParseError> {
        let object = raw.as_object().ok_or(ParseError::NotAnObject)?;

        if let Some(Value::Array(variables)) = object.get("variables") {
            return Ok(Self::VariablesArray(variables));
        }

        match object.get("data") {
            Some(Value::Array(points)) => Ok(Self::TimePointMajor(points)),
            Some(_) => Err(ParseError::NotAnArray("data".to_string())),
            None => Err(ParseError::MissingArray),
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::VariablesArray(_) => "variables-array",
            Self::TimePointMajor(_) => "time-point-major",
        }
    }
}

/// Parse a raw projection response into the uniform model.
///
/// `catalog` supplies metadata for shapes that do not carry it inline; `now` is
/// the reference instant for picking each variable's current value.
///
/// # Example
/// ```
/// use chrono::DateTime;
/// use havvarsel_lib::{catalog::MetadataMap, projection::normalize, GeoPoint};
///
/// let raw = serde_json::json!({"data": [
///     {"rawTime": 1000, "data": [{"key": "temperature", "value": "10.5"}]},
///     {"rawTime": 2000, "data": [{"key": "temperature", "value": "11.0"}]},
/// ]});
/// let now = DateTime::from_timestamp_millis(1900).unwrap();
/// let result = normalize(&raw, GeoPoint::new(5.3, 60.4), &MetadataMap::new(), now).unwrap();
///
/// let temperature = result.variable("temperature").unwrap();
/// assert_eq!(temperature.series.len(), 2);
/// assert_eq!(temperature.current, Some(11.0));
/// ```
pub fn normalize(
    raw: &Value,
    query_point: GeoPoint,
    catalog: &MetadataMap,
    now: DateTime<Utc>,
) -> Result<ProjectionResult, ParseError> {
    let payload = RawPayload::detect(raw)?;
    debug!(shape = payload.shape_name(), "detected projection shape");

    let mut collector = Collector::default();
    match payload {
        RawPayload::VariablesArray(variables) => {
            collect_variables_array(variables, catalog, &mut collector)?
        }
        RawPayload::TimePointMajor(points) => {
            collect_time_points(points, catalog, &mut collector)?
        }
    }

    let variables = collector.finish(now.timestamp_millis());
    debug!(variables = variables.len(), "normalized projection");

    // detect() already proved this is an object
    let nearest_grid = raw
        .as_object()
        .map(|object| nearest_grid(object, query_point))
        .unwrap_or(query_point);

    Ok(ProjectionResult {
        variables,
        query_point,
        nearest_grid,
    })
}

/// Parse one sample value leniently.
///
/// Numbers and numeric strings become `Some`; null, missing, non-numeric and
/// non-finite values ("NaN", "inf") become `None`.
pub fn parse_value(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Read an upstream `[{key, value}, ...]` metadata array.
///
/// A missing or null field is an empty list. Entries without a string `key` are
/// skipped; non-string values are kept in their JSON text form.
pub fn parse_metadata(value: Option<&Value>, field: &str) -> Result<Vec<MetadataEntry>, ParseError> {
    let entries = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(ParseError::NotAnArray(field.to_string())),
    };

    let mut metadata = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let entry = entry
            .as_object()
            .ok_or_else(|| ParseError::NotAnObjectElement(format!("{field}[{index}]")))?;
        let Some(key) = entry.get("key").and_then(Value::as_str) else {
            continue;
        };
        let value = match entry.get("value") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };
        metadata.push(MetadataEntry::new(key, value));
    }
    Ok(metadata)
}

fn collect_variables_array(
    variables: &[Value],
    catalog: &MetadataMap,
    collector: &mut Collector,
) -> Result<(), ParseError> {
    for (index, variable) in variables.iter().enumerate() {
        let field = format!("variables[{index}]");
        let variable = variable
            .as_object()
            .ok_or_else(|| ParseError::NotAnObjectElement(field.clone()))?;

        let Some(name) = non_empty_str(variable, "variableName")
            .or_else(|| non_empty_str(variable, "variable"))
        else {
            warn!(index, "skipping projection variable without a name");
            continue;
        };

        let inline = parse_metadata(variable.get("metadata"), &format!("{field}.metadata"))?;
        let metadata = if inline.is_empty() {
            catalog.get(name).cloned().unwrap_or_default()
        } else {
            inline
        };
        let builder = collector.builder(name, || metadata);

        let data_field = format!("{field}.data");
        for (point_index, point) in array_or_empty(variable.get("data"), &data_field)?
            .iter()
            .enumerate()
        {
            let point_field = format!("{data_field}[{point_index}]");
            let point = point
                .as_object()
                .ok_or_else(|| ParseError::NotAnObjectElement(point_field.clone()))?;
            let raw_time = raw_time(point, &point_field)?;
            builder.push(raw_time, parse_value(point.get("value")))?;
        }
    }
    Ok(())
}

fn collect_time_points(
    points: &[Value],
    catalog: &MetadataMap,
    collector: &mut Collector,
) -> Result<(), ParseError> {
    debug!(time_points = points.len(), "parsing time-point-major payload");

    for (index, point) in points.iter().enumerate() {
        let field = format!("data[{index}]");
        let point = point
            .as_object()
            .ok_or_else(|| ParseError::NotAnObjectElement(field.clone()))?;
        let raw_time = raw_time(point, &field)?;

        let items_field = format!("{field}.data");
        for (item_index, item) in array_or_empty(point.get("data"), &items_field)?
            .iter()
            .enumerate()
        {
            let item = item
                .as_object()
                .ok_or_else(|| ParseError::NotAnObjectElement(format!("{items_field}[{item_index}]")))?;
            let Some(key) = non_empty_str(item, "key") else {
                continue;
            };

            let builder = collector.builder(key, || {
                let metadata = catalog.get(key).cloned().unwrap_or_default();
                debug!(variable = key, entries = metadata.len(), "first sight of variable");
                metadata
            });
            builder.push(raw_time, parse_value(item.get("value")))?;
        }
    }
    Ok(())
}

fn nearest_grid(object: &Map<String, Value>, query_point: GeoPoint) -> GeoPoint {
    match object.get(CLOSEST_GRID_FIELD) {
        Some(Value::Object(grid)) => GeoPoint {
            lon: coordinate(grid, "lon").unwrap_or(query_point.lon),
            lat: coordinate(grid, "lat").unwrap_or(query_point.lat),
        },
        _ => query_point,
    }
}

fn coordinate(grid: &Map<String, Value>, key: &str) -> Option<f64> {
    parse_value(grid.get(key))
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn array_or_empty<'a>(value: Option<&'a Value>, field: &str) -> Result<&'a [Value], ParseError> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ParseError::NotAnArray(field.to_string())),
    }
}

/// `rawTime` in epoch milliseconds. Missing means the epoch itself.
fn raw_time(point: &Map<String, Value>, field: &str) -> Result<i64, ParseError> {
    let invalid = |value: String| ParseError::InvalidField {
        field: format!("{field}.rawTime"),
        value,
    };

    match point.get("rawTime") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|ms| ms.is_finite() && ms.abs() < i64::MAX as f64)
                    .map(|ms| ms as i64)
            })
            .ok_or_else(|| invalid(number.to_string())),
        Some(other) => Err(invalid(other.to_string())),
    }
}

/// Samples for one variable, in the order they were encountered.
struct SeriesBuilder {
    name: String,
    metadata: Vec<MetadataEntry>,
    samples: Vec<Sample>,
}

impl SeriesBuilder {
    fn push(&mut self, raw_time: i64, value: Option<f64>) -> Result<(), ParseError> {
        let sample =
            Sample::from_millis(raw_time, value).ok_or(ParseError::TimestampOutOfRange(raw_time))?;
        self.samples.push(sample);
        Ok(())
    }

    fn finish(self, now_ms: i64) -> VariableSeries {
        let SeriesBuilder {
            name,
            metadata,
            mut samples,
        } = self;

        // Resolve before sorting so ties go to the first sample upstream sent
        let nearest = resolver::nearest_index(samples.iter().map(|s| s.raw_time), now_ms)
            .map(|index| samples[index]);

        // Stable: equal timestamps keep their upstream order
        samples.sort_by_key(|sample| sample.raw_time);

        debug!(
            variable = %name,
            samples = samples.len(),
            current = ?nearest.and_then(|s| s.value),
            "variable resolved"
        );

        VariableSeries {
            name,
            metadata,
            series: samples,
            current: nearest.and_then(|sample| sample.value),
            current_at: nearest.map(|sample| sample.timestamp),
        }
    }
}

/// Per-variable builders in first-seen order.
#[derive(Default)]
struct Collector {
    builders: Vec<SeriesBuilder>,
    index: HashMap<String, usize>,
}

impl Collector {
    fn builder(&mut self, name: &str, metadata: impl FnOnce() -> Vec<MetadataEntry>) -> &mut SeriesBuilder {
        let existing = self.index.get(name).copied();
        let position = match existing {
            Some(position) => position,
            None => {
                self.builders.push(SeriesBuilder {
                    name: name.to_string(),
                    metadata: metadata(),
                    samples: Vec::new(),
                });
                let position = self.builders.len() - 1;
                self.index.insert(name.to_string(), position);
                position
            }
        };
        &mut self.builders[position]
    }

    fn finish(self, now_ms: i64) -> Variables {
        Variables::new(
            self.builders
                .into_iter()
                .map(|builder| builder.finish(now_ms))
                .collect(),
        )
    }
}
