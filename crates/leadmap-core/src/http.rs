// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::backend::{
    AssignParams, Backend, BoundaryResponse, ClusterQuery, CountRequest, CountResponse, ErrorBody,
    NewTerritory, RecordQuery, RecordsResponse, SaveTerritoryResponse, TerritoryRow,
};
use crate::config::BackendConfig;
use crate::geo::{GeoPolygon, LatLng};
use crate::markers::{ClusterPoint, IndividualRecord};
use crate::territory::{Territory, TerritoryId};
use crate::MapError;
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

const CLUSTER_RPC: &str = "rpc/get_cached_clusters";
const ASSIGN_RPC: &str = "rpc/assign_records_within_polygon";
const RECORDS_PATH: &str = "api/records";
const TERRITORIES_PATH: &str = "api/territories";
const SAVE_TERRITORY_PATH: &str = "api/saveTerritory";
const TERRITORY_STATS_PATH: &str = "api/territoryStats";
const BOUNDARY_PATH: &str = "api/zctas";

/// How a non-2xx answer is reported.
#[derive(Clone, Copy)]
enum Failure {
    /// Read paths: any refusal is a network failure.
    Network,
    /// Write paths: the error payload is surfaced as a rejection.
    Rejection,
}

/// [`Backend`] over HTTP/JSON.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, MapError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str, params: &[(String, String)]) -> Result<Url, MapError> {
        let raw = format!("{}/{}", self.base_url, path);
        let parsed = if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        };
        parsed.map_err(|e| MapError::Config(format!("bad backend URL '{}': {}", raw, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, failure: Failure) -> Result<Response, MapError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.describe())
            .unwrap_or_else(|_| body.trim().to_string());
        warn!("Backend answered with error — status={} message={}", status, message);
        Err(match failure {
            Failure::Network => MapError::NetworkFailure(format!("HTTP {}: {}", status, message)),
            Failure::Rejection => MapError::BackendRejection {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        failure: Failure,
    ) -> Result<T, MapError> {
        let response = self.send(builder, failure).await?;
        Ok(response.json::<T>().await?)
    }
}

impl Backend for HttpBackend {
    async fn fetch_clusters(&self, query: &ClusterQuery) -> Result<Vec<ClusterPoint>, MapError> {
        let url = self.url(CLUSTER_RPC, &[])?;
        debug!(
            "Fetching clusters — bucket={} global={}",
            query.bucket,
            query.bounds.is_none()
        );
        let points: Option<Vec<ClusterPoint>> = self
            .send_json(
                self.request(Method::POST, url).json(&query.rpc_params()),
                Failure::Network,
            )
            .await?;
        Ok(points.unwrap_or_default())
    }

    async fn fetch_records(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<IndividualRecord>, MapError> {
        let url = self.url(RECORDS_PATH, &query.query_pairs())?;
        debug!("Fetching records — region={}", query.region);
        let response: RecordsResponse = self
            .send_json(self.request(Method::GET, url), Failure::Network)
            .await?;
        Ok(response.records)
    }

    async fn list_territories(&self) -> Result<Vec<Territory>, MapError> {
        let url = self.url(TERRITORIES_PATH, &[])?;
        let rows: Vec<TerritoryRow> = self
            .send_json(self.request(Method::GET, url), Failure::Network)
            .await?;
        let total = rows.len();
        let territories: Vec<Territory> =
            rows.into_iter().filter_map(TerritoryRow::into_territory).collect();
        if territories.len() < total {
            warn!(
                "Skipped territories without usable geometry — skipped={}",
                total - territories.len()
            );
        }
        Ok(territories)
    }

    async fn save_territory(&self, territory: &NewTerritory) -> Result<Territory, MapError> {
        let url = self.url(SAVE_TERRITORY_PATH, &[])?;
        let response: SaveTerritoryResponse = self
            .send_json(
                self.request(Method::POST, url).json(territory),
                Failure::Rejection,
            )
            .await?;
        let message = response.message.unwrap_or_default();
        let stored = response
            .data
            .into_iter()
            .find_map(TerritoryRow::into_territory)
            .ok_or_else(|| MapError::BackendRejection {
                status: 200,
                message: format!("no stored territory returned {}", message)
                    .trim()
                    .to_string(),
            })?;
        info!("Territory persisted — id={} name={}", stored.id, stored.name);
        Ok(stored)
    }

    async fn delete_territory(&self, id: &TerritoryId) -> Result<(), MapError> {
        let url = self.url(TERRITORIES_PATH, &[("id".to_string(), id.to_string())])?;
        self.send(self.request(Method::DELETE, url), Failure::Rejection)
            .await?;
        Ok(())
    }

    async fn territory_record_count(&self, ring: &[LatLng]) -> Result<u64, MapError> {
        let url = self.url(TERRITORY_STATS_PATH, &[])?;
        let response: CountResponse = self
            .send_json(
                self.request(Method::POST, url)
                    .json(&CountRequest { coordinates: ring }),
                Failure::Network,
            )
            .await?;
        Ok(response.total)
    }

    async fn postal_boundary(&self, zip: &str) -> Result<String, MapError> {
        let url = self.url(BOUNDARY_PATH, &[("zip".to_string(), zip.to_string())])?;
        let response: BoundaryResponse = self
            .send_json(self.request(Method::GET, url), Failure::Network)
            .await?;
        response.geometry.ok_or_else(|| {
            MapError::InvalidGeometry(format!("No polygon found for zip code {}", zip))
        })
    }

    async fn assign_records(&self, ring: &[LatLng], owner: &str) -> Result<u64, MapError> {
        let url = self.url(ASSIGN_RPC, &[])?;
        let params = AssignParams {
            p_polygon: GeoPolygon::from_ring(ring),
            p_user_id: owner.to_string(),
        };
        self.send_json(
            self.request(Method::POST, url).json(&params),
            Failure::Rejection,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            base_url: base.to_string(),
            api_key: None,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_url_joins_and_encodes() {
        let b = backend("https://maps.example.com/");
        let url = b
            .url(TERRITORIES_PATH, &[("id".to_string(), "a b".to_string())])
            .unwrap();
        assert_eq!(url.as_str(), "https://maps.example.com/api/territories?id=a+b");
    }

    #[test]
    fn test_url_without_params_has_no_query() {
        let b = backend("http://localhost:3000");
        let url = b.url(CLUSTER_RPC, &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/rpc/get_cached_clusters");
    }
}
