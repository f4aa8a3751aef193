// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Contract the orchestrator expects from the data backend.
//!
//! Clustering math, polygon storage and containment counts all happen on the
//! other side of this trait. [`crate::http::HttpBackend`] is the production
//! implementation; tests substitute an in-memory one.

use crate::filter::RecordFilter;
use crate::geo::{GeoPolygon, LatLng, Region};
use crate::markers::{ClusterPoint, IndividualRecord};
use crate::territory::{Territory, TerritoryId};
use crate::zoom::ResolutionBucket;
use crate::MapError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterQuery {
    pub bucket: ResolutionBucket,
    /// `None` requests the global aggregate.
    pub bounds: Option<Region>,
}

/// Parameter block of the cluster RPC. Null bounds mean "everything".
#[derive(Debug, Serialize)]
pub struct ClusterRpcParams {
    pub p_zoom_level: u8,
    pub p_min_lat: Option<f64>,
    pub p_min_lon: Option<f64>,
    pub p_max_lat: Option<f64>,
    pub p_max_lon: Option<f64>,
}

impl ClusterQuery {
    pub fn rpc_params(&self) -> ClusterRpcParams {
        ClusterRpcParams {
            p_zoom_level: self.bucket.0,
            p_min_lat: self.bounds.map(|b| b.south),
            p_min_lon: self.bounds.map(|b| b.west),
            p_max_lat: self.bounds.map(|b| b.north),
            p_max_lon: self.bounds.map(|b| b.east),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub region: Region,
    pub filters: Vec<RecordFilter>,
}

impl RecordQuery {
    /// Query string pairs: the four bounds followed by every usable filter.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("min_lat".to_string(), self.region.south.to_string()),
            ("min_lon".to_string(), self.region.west.to_string()),
            ("max_lat".to_string(), self.region.north.to_string()),
            ("max_lon".to_string(), self.region.east.to_string()),
        ];
        pairs.extend(self.filters.iter().filter_map(RecordFilter::to_query_pair));
        pairs
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordsResponse {
    #[serde(rename = "restaurants")]
    pub records: Vec<IndividualRecord>,
}

/// Body of the territory persistence call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTerritory {
    pub name: String,
    pub color: String,
    pub coordinates: Vec<LatLng>,
    #[serde(rename = "zipCode", skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
}

/// Territory row as the backend returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct TerritoryRow {
    pub id: serde_json::Value,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub geom: Option<GeoPolygon>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TerritoryRow {
    /// Converts to a [`Territory`]; rows without a usable polygon yield `None`.
    pub fn into_territory(self) -> Option<Territory> {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let ring = self.geom.map(|g| g.outer_ring()).unwrap_or_default();
        if ring.is_empty() {
            return None;
        }
        Some(Territory {
            id: TerritoryId::Stored(id),
            name: self.name,
            color: self
                .color
                .unwrap_or_else(|| crate::territory::DEFAULT_COLOR.to_string()),
            ring,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveTerritoryResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Vec<TerritoryRow>,
}

#[derive(Debug, Serialize)]
pub struct CountRequest<'a> {
    pub coordinates: &'a [LatLng],
}

#[derive(Debug, Deserialize)]
pub struct CountResponse {
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct BoundaryResponse {
    pub geometry: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignParams {
    pub p_polygon: GeoPolygon,
    pub p_user_id: String,
}

/// Error payload shape shared by the territory endpoints.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn describe(&self) -> String {
        match &self.details {
            Some(details) => format!("{} ({})", self.message, details),
            None => self.message.clone(),
        }
    }
}

/// Data operations the viewport and territory layers depend on.
///
/// Futures are polled on the map's single event loop and need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait Backend {
    async fn fetch_clusters(&self, query: &ClusterQuery) -> Result<Vec<ClusterPoint>, MapError>;

    async fn fetch_records(&self, query: &RecordQuery)
        -> Result<Vec<IndividualRecord>, MapError>;

    async fn list_territories(&self) -> Result<Vec<Territory>, MapError>;

    /// Persists a territory and returns the stored record with its assigned id.
    async fn save_territory(&self, territory: &NewTerritory) -> Result<Territory, MapError>;

    async fn delete_territory(&self, id: &TerritoryId) -> Result<(), MapError>;

    /// Number of records inside the closed ring.
    async fn territory_record_count(&self, ring: &[LatLng]) -> Result<u64, MapError>;

    /// WKT `POLYGON((lng lat, ...))` boundary for a postal code.
    async fn postal_boundary(&self, zip: &str) -> Result<String, MapError>;

    /// Assigns every record inside the ring to `owner`; returns how many changed.
    async fn assign_records(&self, ring: &[LatLng], owner: &str) -> Result<u64, MapError>;
}
