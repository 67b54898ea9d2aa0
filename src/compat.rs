//! # Legacy Single-Variable Reading
//!
//! Older consumers only understand one temperature reading with a flat forecast
//! list. This module maps a [`ProjectionResult`] onto that shape without any
//! fetching of its own.
//!
//! The source variable is `temperature` when present, otherwise the first variable
//! of the response, otherwise nothing (the coordinates are still reported).
//! The reported `timestamp` is the instant of the sample `current_temperature` was
//! taken from, so the two always describe the same moment.

use crate::{ProjectionResult, VariableSeries};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Variable preferred as the legacy reading's source.
const PREFERRED_VARIABLE: &str = "temperature";

/// One entry of the legacy forecast list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegacyForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
}

/// Flat reading for single-variable display code.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegacyReading {
    pub current_temperature: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub longitude: f64,
    pub latitude: f64,
    pub nearest_grid_lon: f64,
    pub nearest_grid_lat: f64,
    pub forecast: Vec<LegacyForecastPoint>,
}

/// The series a legacy reading is built from.
pub fn legacy_source(result: &ProjectionResult) -> Option<&VariableSeries> {
    result
        .variable(PREFERRED_VARIABLE)
        .or_else(|| result.variables.first())
}

/// Project `result` onto the legacy single-variable shape.
pub fn project_legacy(result: &ProjectionResult) -> LegacyReading {
    let source = legacy_source(result);

    let forecast = source
        .map(|series| {
            series
                .series
                .iter()
                .map(|sample| LegacyForecastPoint {
                    timestamp: sample.timestamp,
                    temperature: sample.value,
                })
                .collect()
        })
        .unwrap_or_default();

    LegacyReading {
        current_temperature: source.and_then(|series| series.current),
        timestamp: source.and_then(|series| series.current_at),
        longitude: result.query_point.lon,
        latitude: result.query_point.lat,
        nearest_grid_lon: result.nearest_grid.lon,
        nearest_grid_lat: result.nearest_grid.lat,
        forecast,
    }
}
