//! # Variable Metadata Catalog
//!
//! Read-only views over the service's variable description endpoints:
//! - `/variables` for the unit label of a variable
//! - `/dataprojectionvariables` for long names and full metadata arrays
//!
//! Catalog data is advisory. It names and labels sensors, but a missing unit or
//! description must never stop temperature readings from flowing. Each public
//! operation therefore runs a fallible `try_*` twin and collapses its error to a
//! documented fallback, logging the reason:
//!
//! | Operation | Fallback |
//! |---|---|
//! | [`Catalog::unit_label`] | `"°C"` |
//! | [`Catalog::available_variables`] | `[("temperature", "Sea water potential temperature")]` |
//! | [`Catalog::variables_metadata`] | empty map |
//! | [`Catalog::entries`] | a single temperature entry without metadata |

use crate::projection::parse_metadata;
use crate::transport::{Endpoints, JsonFetcher, TransportError};
use crate::{metadata_value, MetadataEntry, VariableCatalogEntry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Variable name to its verbatim metadata array.
pub type MetadataMap = BTreeMap<String, Vec<MetadataEntry>>;

/// Unit label used when the catalog cannot supply one.
pub const FALLBACK_UNIT: &str = "°C";

/// The variable every deployment is assumed to have.
pub const FALLBACK_VARIABLE: &str = "temperature";

/// Description paired with [`FALLBACK_VARIABLE`].
pub const FALLBACK_DESCRIPTION: &str = "Sea water potential temperature";

/// Catalog row describing the time dimension rather than a variable.
const TIME_DIMENSION: &str = "time";

/// Why a catalog lookup fell back. Never escapes the public operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("catalog response has no `row` array")]
    MissingRows,

    #[error("catalog lists no usable variables")]
    Empty,

    #[error("variable `{0}` has no `units` entry")]
    NoUnits(String),
}

/// Catalog client sharing the poller's fetcher.
pub struct Catalog<F> {
    fetcher: Arc<F>,
    endpoints: Endpoints,
}

impl<F: JsonFetcher> Catalog<F> {
    pub fn new(fetcher: Arc<F>, endpoints: Endpoints) -> Self {
        Self { fetcher, endpoints }
    }

    /// Unit label of `variable`, or [`FALLBACK_UNIT`] if anything goes wrong.
    pub async fn unit_label(&self, variable: &str) -> String {
        self.try_unit_label(variable).await.unwrap_or_else(|err| {
            warn!(variable, error = %err, "using fallback unit label");
            FALLBACK_UNIT.to_string()
        })
    }

    /// `(name, description)` pairs in catalog order; the description is
    /// `long_name`, else the name itself.
    ///
    /// Falls back to a temperature-only list on any failure or an empty catalog.
    pub async fn available_variables(&self) -> Vec<(String, String)> {
        match self.try_entries().await {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| (entry.name, entry.description))
                .collect(),
            Err(err) => {
                warn!(error = %err, "using fallback variable list");
                vec![(
                    FALLBACK_VARIABLE.to_string(),
                    FALLBACK_DESCRIPTION.to_string(),
                )]
            }
        }
    }

    /// Variable name to its full metadata array; empty on failure.
    pub async fn variables_metadata(&self) -> MetadataMap {
        match self.try_rows(&self.endpoints.projection_variables()).await {
            Ok(rows) => {
                let metadata: MetadataMap = variable_rows(&rows).collect();
                debug!(variables = metadata.len(), "retrieved variable metadata");
                metadata
            }
            Err(err) => {
                warn!(error = %err, "variable metadata unavailable");
                MetadataMap::new()
            }
        }
    }

    /// Full catalog records, for building one sensor per variable.
    pub async fn entries(&self) -> Vec<VariableCatalogEntry> {
        self.try_entries().await.unwrap_or_else(|err| {
            warn!(error = %err, "using fallback catalog entry");
            vec![VariableCatalogEntry {
                name: FALLBACK_VARIABLE.to_string(),
                description: FALLBACK_DESCRIPTION.to_string(),
                metadata: Vec::new(),
            }]
        })
    }

    pub async fn try_unit_label(&self, variable: &str) -> Result<String, CatalogError> {
        let rows = self.try_rows(&self.endpoints.variables()).await?;
        let row = variable_rows(&rows).find(|(name, _)| name == variable);
        row.and_then(|(_, metadata)| metadata_value(&metadata, "units").map(str::to_string))
            .ok_or_else(|| CatalogError::NoUnits(variable.to_string()))
    }

    pub async fn try_entries(&self) -> Result<Vec<VariableCatalogEntry>, CatalogError> {
        let rows = self.try_rows(&self.endpoints.projection_variables()).await?;
        let entries: Vec<VariableCatalogEntry> = variable_rows(&rows)
            .map(|(name, metadata)| VariableCatalogEntry {
                description: metadata_value(&metadata, "long_name")
                    .unwrap_or(&name)
                    .to_string(),
                name,
                metadata,
            })
            .collect();

        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        debug!(variables = entries.len(), "found available variables");
        Ok(entries)
    }

    async fn try_rows(&self, url: &str) -> Result<Vec<Value>, CatalogError> {
        let mut body = self.fetcher.fetch(url, &[]).await?;
        match body.get_mut("row").map(Value::take) {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(CatalogError::MissingRows),
        }
    }
}

/// `(name, metadata)` for every usable catalog row.
///
/// Skips non-object rows, rows without a `variableName`, and the time dimension.
/// A row whose metadata is malformed keeps its name with empty metadata.
fn variable_rows(rows: &[Value]) -> impl Iterator<Item = (String, Vec<MetadataEntry>)> + '_ {
    rows.iter().filter_map(|row| {
        let row = row.as_object()?;
        let name = row
            .get("variableName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty() && *name != TIME_DIMENSION)?;
        let metadata = parse_metadata(row.get("metadata"), "metadata").unwrap_or_default();
        Some((name.to_string(), metadata))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    /// Answers each URL with a fixed body or HTTP status.
    #[derive(Default)]
    struct Scripted {
        responses: HashMap<String, Result<Value, u16>>,
    }

    impl Scripted {
        fn with(mut self, url: String, response: Result<Value, u16>) -> Self {
            self.responses.insert(url, response);
            self
        }
    }

    #[async_trait]
    impl JsonFetcher for Scripted {
        async fn fetch(&self, url: &str, _query: &[(&str, String)]) -> Result<Value, TransportError> {
            match self.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(TransportError::Remote {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(TransportError::Remote {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn catalog_for(fetcher: Scripted) -> Catalog<Scripted> {
        Catalog::new(Arc::new(fetcher), Endpoints::default())
    }

    fn projection_variables() -> Value {
        json!({"row": [
            {"variableName": "time", "metadata": [{"key": "long_name", "value": "time"}]},
            {"variableName": "temperature", "metadata": [
                {"key": "units", "value": "Celsius"},
                {"key": "long_name", "value": "Sea water potential temperature"},
                {"key": "standard_name", "value": "sea_water_potential_temperature"},
            ]},
            {"variableName": "salinity", "metadata": [{"key": "units", "value": "1e-3"}]},
            "not-a-row",
            {"metadata": []},
        ]})
    }

    #[tokio::test]
    async fn unit_label_reads_units_metadata() {
        let endpoints = Endpoints::default();
        let catalog = catalog_for(Scripted::default().with(
            endpoints.variables(),
            Ok(json!({"row": [
                {"variableName": "salinity", "metadata": [{"key": "units", "value": "1e-3"}]},
                {"variableName": "temperature", "metadata": [{"key": "units", "value": "Celsius"}]},
            ]})),
        ));

        assert_eq!(catalog.unit_label("temperature").await, "Celsius");
        assert_eq!(catalog.unit_label("salinity").await, "1e-3");
        assert_eq!(catalog.unit_label("u_eastward").await, FALLBACK_UNIT);
    }

    #[tokio::test]
    async fn unit_label_degrades_on_failure() {
        let endpoints = Endpoints::default();
        let failing = catalog_for(Scripted::default().with(endpoints.variables(), Err(500)));
        assert_eq!(failing.unit_label("temperature").await, "°C");

        let malformed = catalog_for(Scripted::default().with(endpoints.variables(), Ok(json!([]))));
        assert_eq!(malformed.unit_label("temperature").await, "°C");

        let no_units = catalog_for(Scripted::default().with(
            endpoints.variables(),
            Ok(json!({"row": [{"variableName": "temperature", "metadata": "Celsius"}]})),
        ));
        assert_eq!(no_units.unit_label("temperature").await, "°C");
    }

    #[tokio::test]
    async fn available_variables_skip_time_and_fall_back_to_name() {
        let endpoints = Endpoints::default();
        let catalog = catalog_for(
            Scripted::default().with(endpoints.projection_variables(), Ok(projection_variables())),
        );

        // Catalog order, not alphabetical
        let expected = vec![
            (
                "temperature".to_string(),
                "Sea water potential temperature".to_string(),
            ),
            ("salinity".to_string(), "salinity".to_string()),
        ];
        assert_eq!(catalog.available_variables().await, expected);
    }

    #[tokio::test]
    async fn metadata_without_value_uses_fallbacks() {
        let endpoints = Endpoints::default();
        let rows = json!({"row": [
            {"variableName": "salinity", "metadata": [{"key": "units"}, {"key": "long_name"}]},
            {"variableName": "temperature", "metadata": [
                {"key": "units", "value": ""},
                {"key": "long_name", "value": null},
            ]},
        ]});
        let catalog = catalog_for(
            Scripted::default()
                .with(endpoints.variables(), Ok(rows.clone()))
                .with(endpoints.projection_variables(), Ok(rows)),
        );

        assert_eq!(catalog.unit_label("salinity").await, FALLBACK_UNIT);
        assert_eq!(catalog.unit_label("temperature").await, FALLBACK_UNIT);
        assert_eq!(
            catalog.available_variables().await,
            vec![
                ("salinity".to_string(), "salinity".to_string()),
                ("temperature".to_string(), "temperature".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn available_variables_fallback_on_malformed_body() {
        let endpoints = Endpoints::default();
        let expected = vec![(
            "temperature".to_string(),
            "Sea water potential temperature".to_string(),
        )];

        for body in [json!({}), json!({"row": {}}), json!({"row": []}), json!("oops")] {
            let catalog =
                catalog_for(Scripted::default().with(endpoints.projection_variables(), Ok(body)));
            assert_eq!(catalog.available_variables().await, expected);
        }

        let unreachable = catalog_for(Scripted::default());
        assert_eq!(unreachable.available_variables().await, expected);
    }

    #[tokio::test]
    async fn variables_metadata_keeps_arrays_verbatim() {
        let endpoints = Endpoints::default();
        let catalog = catalog_for(
            Scripted::default().with(endpoints.projection_variables(), Ok(projection_variables())),
        );

        let metadata = catalog.variables_metadata().await;
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata["temperature"].len(), 3);
        assert_eq!(
            metadata["salinity"],
            vec![MetadataEntry::new("units", "1e-3")]
        );
        assert!(!metadata.contains_key("time"));
    }

    #[tokio::test]
    async fn variables_metadata_is_empty_on_failure() {
        let endpoints = Endpoints::default();
        let catalog =
            catalog_for(Scripted::default().with(endpoints.projection_variables(), Err(502)));
        assert!(catalog.variables_metadata().await.is_empty());
    }

    #[tokio::test]
    async fn entries_carry_name_description_and_metadata() {
        let endpoints = Endpoints::default();
        let catalog = catalog_for(
            Scripted::default().with(endpoints.projection_variables(), Ok(projection_variables())),
        );

        let entries = catalog.entries().await;
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["temperature", "salinity"]);
        assert_eq!(entries[0].description, "Sea water potential temperature");
        assert_eq!(entries[1].description, "salinity");

        let fallback = catalog_entries_fallback().await;
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].name, "temperature");
        assert!(fallback[0].metadata.is_empty());
    }

    async fn catalog_entries_fallback() -> Vec<VariableCatalogEntry> {
        catalog_for(Scripted::default()).entries().await
    }
}
