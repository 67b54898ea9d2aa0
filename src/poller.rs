//! # Polling Facade
//!
//! One [`Poller`] per configured location. Each call to [`Poller::refresh`] runs a
//! single sequence of network calls to completion:
//!
//! 1. catalog metadata for the variables (never fatal, see [`crate::catalog`])
//! 2. the projection for the enabled variables at the configured point and depth
//! 3. normalization into a [`ProjectionResult`]
//!
//! A successful refresh replaces the published snapshot in one step. A failed one
//! (transport or parse error) leaves the previous snapshot visible and reports the
//! error to the caller. Dropping a refresh future mid-flight abandons the request
//! and publishes nothing.
//!
//! Refreshes for the same location must not overlap; the scheduler driving the
//! poller keeps at most one in flight.

use crate::catalog::{Catalog, MetadataMap, FALLBACK_VARIABLE};
use crate::projection::{self, ParseError};
use crate::transport::{Endpoints, JsonFetcher, TransportError};
use crate::{GeoPoint, ProjectionResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Grid points closer than this (degrees, per axis) count as the requested point.
const GRID_TOLERANCE_DEG: f64 = 0.001;

/// The most recent successful result, if any.
pub type Snapshot = Option<Arc<ProjectionResult>>;

/// Why a refresh cycle failed as a whole.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("projection fetch failed: {0}")]
    Transport(#[from] TransportError),

    #[error("projection response could not be parsed: {0}")]
    Parse(#[from] ParseError),
}

/// Where to sample the ocean.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
    /// Depth in meters below the surface
    pub depth: u32,
}

impl Location {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

/// Outcome of resolving a requested point against the model grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridResolution {
    pub requested: GeoPoint,
    /// Nearest grid point with data, or `requested` if the lookup failed
    pub resolved: GeoPoint,
    /// Whether `resolved` came from the service
    pub from_upstream: bool,
}

impl GridResolution {
    /// True when the grid point differs noticeably from the request.
    pub fn adjusted(&self) -> bool {
        (self.resolved.lat - self.requested.lat).abs() > GRID_TOLERANCE_DEG
            || (self.resolved.lon - self.requested.lon).abs() > GRID_TOLERANCE_DEG
    }
}

/// Variables to request for an enabled set.
///
/// Keeps the caller's order, drops blanks and duplicates, and always includes
/// `temperature` (appended when missing).
///
/// # Example
/// ```
/// use havvarsel_lib::poller::request_variables;
///
/// assert_eq!(request_variables::<&str>(&[]), vec!["temperature"]);
/// assert_eq!(
///     request_variables(&["salinity", "salinity"]),
///     vec!["salinity", "temperature"]
/// );
/// ```
pub fn request_variables<S: AsRef<str>>(enabled: &[S]) -> Vec<String> {
    let mut variables: Vec<String> = Vec::with_capacity(enabled.len() + 1);
    for name in enabled.iter().map(|name| name.as_ref().trim()) {
        if !name.is_empty() && !variables.iter().any(|known| known == name) {
            variables.push(name.to_string());
        }
    }
    if !variables.iter().any(|known| known == FALLBACK_VARIABLE) {
        variables.push(FALLBACK_VARIABLE.to_string());
    }
    variables
}

/// Refresh orchestrator and owner of the published snapshot.
pub struct Poller<F> {
    fetcher: Arc<F>,
    catalog: Catalog<F>,
    endpoints: Endpoints,
    location: Location,
    snapshot: watch::Sender<Snapshot>,
}

impl<F: JsonFetcher> Poller<F> {
    pub fn new(fetcher: Arc<F>, endpoints: Endpoints, location: Location) -> Self {
        let catalog = Catalog::new(Arc::clone(&fetcher), endpoints.clone());
        let (snapshot, _) = watch::channel(None);
        Self {
            fetcher,
            catalog,
            endpoints,
            location,
            snapshot,
        }
    }

    /// Catalog sharing this poller's fetcher and endpoints.
    pub fn catalog(&self) -> &Catalog<F> {
        &self.catalog
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// The last successfully published result.
    pub fn latest(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Run one refresh cycle against the system clock.
    pub async fn refresh<S: AsRef<str>>(
        &self,
        enabled: &[S],
    ) -> Result<Arc<ProjectionResult>, RefreshError> {
        self.refresh_at(enabled, Utc::now()).await
    }

    /// Run one refresh cycle, resolving current values against `now`.
    pub async fn refresh_at<S: AsRef<str>>(
        &self,
        enabled: &[S],
        now: DateTime<Utc>,
    ) -> Result<Arc<ProjectionResult>, RefreshError> {
        let variables = request_variables(enabled);
        debug!(variables = %variables.join(","), "refresh started");

        let metadata = self.catalog.variables_metadata().await;
        let result = Arc::new(self.fetch_projection(&variables, &metadata, now).await?);

        self.snapshot.send_replace(Some(Arc::clone(&result)));
        info!(
            variables = result.variables.len(),
            grid_lon = result.nearest_grid.lon,
            grid_lat = result.nearest_grid.lat,
            "published projection snapshot"
        );
        Ok(result)
    }

    /// Fetch and normalize one projection without touching the snapshot.
    pub async fn fetch_projection(
        &self,
        variables: &[String],
        metadata: &MetadataMap,
        now: DateTime<Utc>,
    ) -> Result<ProjectionResult, RefreshError> {
        let url = self
            .endpoints
            .projection(variables, self.location.longitude, self.location.latitude);
        let query = [("depth", self.location.depth.to_string())];
        info!(url = %url, depth = self.location.depth, "fetching projection");

        let raw = self.fetcher.fetch(&url, &query).await?;
        let result = projection::normalize(&raw, self.location.point(), metadata, now)?;
        info!(variables = result.variables.len(), "parsed projection");
        Ok(result)
    }

    /// Find the grid point the service will actually report for this location.
    ///
    /// Used during setup; any failure falls back to the requested point.
    pub async fn resolve_grid_point(&self) -> GridResolution {
        let requested = self.location.point();
        let variables = [FALLBACK_VARIABLE.to_string()];

        match self
            .fetch_projection(&variables, &MetadataMap::new(), Utc::now())
            .await
        {
            Ok(result) => {
                let resolution = GridResolution {
                    requested,
                    resolved: result.nearest_grid,
                    from_upstream: true,
                };
                if resolution.adjusted() {
                    info!(
                        requested_lon = requested.lon,
                        requested_lat = requested.lat,
                        grid_lon = resolution.resolved.lon,
                        grid_lat = resolution.resolved.lat,
                        "using nearest grid point instead of requested coordinates"
                    );
                }
                resolution
            }
            Err(err) => {
                debug!(error = %err, "could not determine nearest grid point");
                GridResolution {
                    requested,
                    resolved: requested,
                    from_upstream: false,
                }
            }
        }
    }
}
